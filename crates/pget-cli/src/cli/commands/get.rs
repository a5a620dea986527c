//! `pget get <url>...` – fetch a batch of URLs into a directory.

use anyhow::{Context, Result};
use pget_core::config::FetchConfig;
use pget_core::naming;
use pget_core::transport::CurlTransport;
use pget_core::Coordinator;
use std::path::PathBuf;
use url::Url;

use crate::cli::output::OutputDir;

/// Arguments of `pget get` after CLI parsing.
#[derive(Debug, Clone)]
pub struct GetArgs {
    pub urls: Vec<String>,
    pub parallel: Option<usize>,
    pub timeout: Option<f64>,
    pub output_dir: PathBuf,
    pub sha256: bool,
}

/// Parse every URL up front so a typo fails before anything is fetched.
pub fn parse_urls(raw: &[String]) -> Result<Vec<Url>> {
    raw.iter()
        .map(|s| Url::parse(s).with_context(|| format!("invalid URL: {}", s)))
        .collect()
}

/// Config with command-line overrides applied.
pub fn effective_config(cfg: &FetchConfig, args: &GetArgs) -> FetchConfig {
    let mut cfg = cfg.clone();
    if let Some(n) = args.parallel {
        cfg.max_concurrency = n;
    }
    if let Some(secs) = args.timeout {
        cfg.timeout_secs = secs;
    }
    cfg
}

pub async fn run_get(cfg: &FetchConfig, args: GetArgs) -> Result<()> {
    let urls = parse_urls(&args.urls)?;
    let cfg = effective_config(cfg, &args);
    let coordinator = Coordinator::from_config(&cfg)?;
    let transport = CurlTransport::new(cfg.curl_options());
    let out = OutputDir::create(&args.output_dir)?;
    let print_digest = args.sha256;

    tracing::info!(
        urls = urls.len(),
        parallel = coordinator.max_concurrency(),
        timeout_secs = cfg.timeout_secs,
        dir = %args.output_dir.display(),
        "get"
    );

    let summary = tokio::task::spawn_blocking(move || {
        let (result, summary) =
            coordinator.run_batch_with_summary(&transport, &urls, |url, response| {
                let name = naming::derive_filename(url, response.content_disposition.as_deref());
                let path = out.reserve(&name);
                let saved = out
                    .save(&path, response.into_body())
                    .with_context(|| format!("save {}", url))?;
                tracing::debug!(url = %url, path = %saved.path.display(), bytes = saved.bytes, "saved");
                if print_digest {
                    println!("{}  {}", saved.sha256, saved.path.display());
                } else {
                    println!("{}", saved.path.display());
                }
                Ok(())
            });
        result.map(|()| summary)
    })
    .await
    .context("batch task join")??;

    if summary.skipped > 0 {
        eprintln!(
            "{} URL(s) not started before the {}s deadline",
            summary.skipped, cfg.timeout_secs
        );
    }
    tracing::info!(
        fetched = summary.fetched,
        skipped = summary.skipped,
        "get completed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parallel: Option<usize>, timeout: Option<f64>) -> GetArgs {
        GetArgs {
            urls: vec![],
            parallel,
            timeout,
            output_dir: PathBuf::from("."),
            sha256: false,
        }
    }

    #[test]
    fn parse_urls_rejects_garbage() {
        let ok = parse_urls(&["https://example.com/a".to_string()]).unwrap();
        assert_eq!(ok[0].path(), "/a");
        let err = parse_urls(&["https://example.com/a".to_string(), "not a url".to_string()])
            .unwrap_err();
        assert!(format!("{:#}", err).contains("invalid URL: not a url"));
    }

    #[test]
    fn flags_override_config() {
        let cfg = FetchConfig::default();
        let eff = effective_config(&cfg, &args(Some(3), Some(1.5)));
        assert_eq!(eff.max_concurrency, 3);
        assert_eq!(eff.timeout_secs, 1.5);
        let unchanged = effective_config(&cfg, &args(None, None));
        assert_eq!(unchanged, cfg);
    }

    #[test]
    fn zero_parallel_fails_before_fetching() {
        let cfg = effective_config(&FetchConfig::default(), &args(Some(0), None));
        assert!(Coordinator::from_config(&cfg).is_err());
    }
}
