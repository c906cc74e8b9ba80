//! Server configuration: defaults, then environment variables, then CLI flags.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::{Result, bail};

use crate::identity::MIN_TOKEN_BITS;
use crate::security::HashParams;

pub const ENV_PREFIX: &str = "SESSIONGATE_";
pub const DEFAULT_TOKEN_HEADER: &str = "x-auth-token";
pub const DEFAULT_MAP_NAME: &str = "userTokenMap";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Per-process map; fine for a single node.
    Memory,
    /// Shared directory; every process on the same directory sees the same sessions.
    File,
}

impl StoreBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Some(StoreBackend::Memory),
            "file" | "dir" | "shared" => Some(StoreBackend::File),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub http_port: u16,
    pub token_header: String,
    pub store: StoreBackend,
    pub store_dir: PathBuf,
    pub map_name: String,
    /// `None`: tokens live until explicit logout.
    pub session_ttl: Option<Duration>,
    pub sweep_interval: Duration,
    pub token_bits: u32,
    pub max_login_body: usize,
    /// Seeded as the first admin when the user repository is empty and both are set.
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
    pub hash_params: HashParams,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            http_port: 8080,
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            store: StoreBackend::Memory,
            store_dir: PathBuf::from("sessions"),
            map_name: DEFAULT_MAP_NAME.to_string(),
            session_ttl: None,
            sweep_interval: Duration::from_secs(30),
            token_bits: MIN_TOKEN_BITS,
            max_login_body: 16 * 1024,
            admin_user: default_admin(),
            admin_password: default_admin(),
            hash_params: HashParams::default(),
        }
    }
}

// Debug builds fall back to admin/admin; release builds need SESSIONGATE_ADMIN_USER
// and SESSIONGATE_ADMIN_PASSWORD.
#[cfg(debug_assertions)]
fn default_admin() -> Option<String> { Some("admin".to_string()) }

#[cfg(not(debug_assertions))]
fn default_admin() -> Option<String> { None }

/// `SESSIONGATE_*` variable source, keyed by the unprefixed name.
struct EnvVars<F: Fn(&str) -> Option<String>>(F);

impl<F: Fn(&str) -> Option<String>> EnvVars<F> {
    fn var(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn u64(&self, name: &str) -> Result<Option<u64>> {
        match self.var(name) {
            Some(v) => match v.trim().parse::<u64>() {
                Ok(n) => Ok(Some(n)),
                Err(_) => bail!("invalid {}{} '{}': expected an unsigned integer", ENV_PREFIX, name, v),
            },
            None => Ok(None),
        }
    }

    fn u32(&self, name: &str) -> Result<Option<u32>> {
        match self.u64(name)? {
            Some(n) => match u32::try_from(n) {
                Ok(v) => Ok(Some(v)),
                Err(_) => bail!("{}{} = {} is out of range (max {})", ENV_PREFIX, name, n, u32::MAX),
            },
            None => Ok(None),
        }
    }

    fn port(&self, name: &str) -> Result<Option<u16>> {
        match self.u64(name)? {
            Some(n) => match u16::try_from(n) {
                Ok(p) => Ok(Some(p)),
                Err(_) => bail!("{}{} = {} is not a valid port", ENV_PREFIX, name, n),
            },
            None => Ok(None),
        }
    }
}

fn parse_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].as_str());
        }
        i += 1;
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

// 0 means "no expiry" for the TTL knobs
fn ttl_from_secs(secs: u64) -> Option<Duration> { if secs == 0 { None } else { Some(Duration::from_secs(secs)) } }

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(format!("{}{}", ENV_PREFIX, name)).ok())
    }

    /// Same as `from_env`, reading variables through `lookup` (unprefixed names).
    pub fn from_vars<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let vars = EnvVars(lookup);
        let mut c = Self::default();
        if let Some(v) = vars.var("BIND") { c.bind = v; }
        if let Some(p) = vars.port("HTTP_PORT")? { c.http_port = p; }
        if let Some(v) = vars.var("TOKEN_HEADER") { c.token_header = v.trim().to_lowercase(); }
        if let Some(v) = vars.var("STORE") {
            let Some(b) = StoreBackend::parse(&v) else { bail!("unknown {}STORE '{}': expected memory|file", ENV_PREFIX, v); };
            c.store = b;
        }
        if let Some(v) = vars.var("STORE_DIR") { c.store_dir = PathBuf::from(v); }
        if let Some(v) = vars.var("MAP_NAME") { c.map_name = v; }
        if let Some(s) = vars.u64("SESSION_TTL_SECS")? { c.session_ttl = ttl_from_secs(s); }
        if let Some(s) = vars.u64("SWEEP_INTERVAL_SECS")? { c.sweep_interval = Duration::from_secs(s.max(1)); }
        if let Some(b) = vars.u32("TOKEN_BITS")? { c.token_bits = b; }
        if let Some(n) = vars.u64("MAX_LOGIN_BODY")? {
            c.max_login_body = usize::try_from(n).map_err(|_| anyhow::anyhow!("{}MAX_LOGIN_BODY = {} is out of range", ENV_PREFIX, n))?;
        }
        if let Some(v) = vars.var("ADMIN_USER") { c.admin_user = Some(v); }
        if let Some(v) = vars.var("ADMIN_PASSWORD") { c.admin_password = Some(v); }
        if let Some(m) = vars.u32("ARGON2_M_KIB")? { c.hash_params.m_cost_kib = m; }
        if let Some(t) = vars.u32("ARGON2_T_COST")? { c.hash_params.t_cost = t; }
        if let Some(p) = vars.u32("ARGON2_P_COST")? { c.hash_params.p_cost = p; }
        c.validate()?;
        Ok(c)
    }

    /// Both halves of the admin account, or nothing.
    pub fn admin_credentials(&self) -> Option<(&str, &str)> {
        match (self.admin_user.as_deref(), self.admin_password.as_deref()) {
            (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        }
    }

    /// CLI arguments override environment.
    pub fn apply_args(mut self, args: &[String]) -> Result<Self> {
        if let Some(v) = parse_arg(args, "--http-port") {
            self.http_port = v.parse::<u16>().map_err(|_| anyhow::anyhow!("invalid --http-port '{}'", v))?;
        }
        if let Some(v) = parse_arg(args, "--bind") { self.bind = v.to_string(); }
        if let Some(v) = parse_arg(args, "--store") {
            let Some(b) = StoreBackend::parse(v) else { bail!("unknown --store '{}': expected memory|file", v); };
            self.store = b;
        }
        if let Some(v) = parse_arg(args, "--store-dir") { self.store_dir = PathBuf::from(v); }
        if let Some(v) = parse_arg(args, "--session-ttl") {
            let secs = v.parse::<u64>().map_err(|_| anyhow::anyhow!("invalid --session-ttl '{}'", v))?;
            self.session_ttl = ttl_from_secs(secs);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.token_bits < MIN_TOKEN_BITS {
            bail!("token entropy must be at least {} bits (got {})", MIN_TOKEN_BITS, self.token_bits);
        }
        if self.token_header.trim().is_empty() { bail!("token header name cannot be empty"); }
        if axum::http::HeaderName::from_bytes(self.token_header.as_bytes()).is_err() {
            bail!("invalid token header name '{}'", self.token_header);
        }
        if self.max_login_body == 0 { bail!("max login body must be positive"); }
        Ok(())
    }

    pub fn usage() -> &'static str {
        "sessiongate server\n\nUSAGE:\n  sessiongate_server [--http-port N] [--bind ADDR] [--store memory|file] [--store-dir PATH] [--session-ttl SECS]\n\nOPTIONS:\n  --http-port N        HTTP port (env: SESSIONGATE_HTTP_PORT, default 8080)\n  --bind ADDR          Bind address (env: SESSIONGATE_BIND, default 0.0.0.0)\n  --store KIND         Session store backend (env: SESSIONGATE_STORE, default memory)\n  --store-dir PATH     Shared directory for the file store (env: SESSIONGATE_STORE_DIR, default sessions)\n  --session-ttl SECS   Session lifetime, 0 = until logout (env: SESSIONGATE_SESSION_TTL_SECS, default 0)\n\nRelease builds seed the first admin only when SESSIONGATE_ADMIN_USER and SESSIONGATE_ADMIN_PASSWORD are both set.\n"
    }
}
