use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// Resolved connection settings for one API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Data-request endpoint, e.g. `https://api.solargis.com/ts/data-request`.
    pub url: String,
    /// Bearer token.
    pub key: String,
    /// Whether to verify TLS certificates.
    pub verify: bool,
}

#[derive(Debug, Default)]
struct RcConfig {
    url: Option<String>,
    key: Option<String>,
    verify: Option<bool>,
}

/// Resolves settings for the API tagged `tag` (`ts` or `tmy`).
///
/// Precedence: explicit arguments, then `SGAPI_<TAG>_URL` / `SGAPI_<TAG>_KEY`,
/// then the first rc file found (`SGAPI_RC`, `./.sgapirc`, `~/.sgapirc`).
pub(crate) fn load_config(
    tag: &str,
    default_url: &str,
    url: Option<String>,
    key: Option<String>,
    verify: Option<bool>,
) -> Result<ClientConfig> {
    resolve(
        tag,
        default_url,
        url,
        key,
        verify,
        |name| std::env::var(name).ok(),
        &rc_candidates(),
    )
}

fn resolve(
    tag: &str,
    default_url: &str,
    url: Option<String>,
    key: Option<String>,
    verify: Option<bool>,
    env: impl Fn(&str) -> Option<String>,
    rc_candidates: &[PathBuf],
) -> Result<ClientConfig> {
    let env_prefix = format!("SGAPI_{}", tag.to_ascii_uppercase());
    let mut url = url.or_else(|| env(&format!("{}_URL", env_prefix)));
    let mut key = key.or_else(|| env(&format!("{}_KEY", env_prefix)));
    let mut file_verify: Option<bool> = None;

    if url.is_none() || key.is_none() || verify.is_none() {
        for rc_path in rc_candidates {
            if rc_path.exists() {
                let cfg = read_rc(rc_path, tag).with_context(|| {
                    format!("failed to read configuration file {}", rc_path.display())
                })?;

                if url.is_none() {
                    url = cfg.url;
                }
                if key.is_none() {
                    key = cfg.key;
                }
                file_verify = cfg.verify;
                break;
            }
        }
    }

    let key = match key {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => {
            if !rc_candidates.is_empty() {
                bail!(
                    "Missing configuration: key (set {}_KEY or put `{}_key:` in one of: {})",
                    env_prefix,
                    tag,
                    rc_candidates
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            bail!(
                "Missing configuration: key (set {}_KEY or create .sgapirc)",
                env_prefix
            );
        }
    };

    let url = url.unwrap_or_else(|| default_url.to_string());
    let verify = verify.or(file_verify).unwrap_or(true);

    Ok(ClientConfig { url, key, verify })
}

fn read_rc(path: &Path, tag: &str) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text, tag))
}

fn parse_rc(text: &str, tag: &str) -> RcConfig {
    let url_key = format!("{}_url", tag);
    let key_key = format!("{}_key", tag);
    let mut cfg = RcConfig::default();

    // Support formatting where `ts_key:` is on one line and the token is on the next line.
    let mut pending_key: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            // Continuation value line (no colon)
            if !line.contains(':') {
                let v = strip_quotes(line).to_string();
                if pk == url_key {
                    cfg.url = Some(v);
                } else if pk == key_key {
                    cfg.key = Some(v);
                }
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            if k == "verify" {
                if !v.is_empty() {
                    cfg.verify = Some(v != "0" && !v.eq_ignore_ascii_case("false"));
                }
            } else if k == url_key || k == key_key {
                if v.is_empty() {
                    pending_key = Some(k.to_string());
                } else if k == url_key {
                    // A URL's own colon ends up in `v`; split_once only cuts the first one.
                    cfg.url = Some(v.to_string());
                } else {
                    cfg.key = Some(v.to_string());
                }
            }
        }
    }

    cfg
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) SGAPI_RC (explicit)
    // 2) ./.sgapirc
    // 3) ~/.sgapirc
    if let Ok(p) = std::env::var("SGAPI_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".sgapirc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".sgapirc"));
    }
    v
}
