use envconfig::Envconfig;
use kube::Client;
use oprc_olm::{config::OlmConfig, init_tracing, runtime};
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cfg = OlmConfig::init_from_env()?.apply_profile_defaults();
    init_tracing(&cfg.log_level);

    // Ensure rustls uses the aws-lc-rs provider explicitly.
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        tracing::debug!(
            ?e,
            "CryptoProvider already installed or incompatible; proceeding"
        );
    }

    cfg.validate()?;
    info!(?cfg, "Starting OLM operatorcondition controllers");

    let client = Client::try_default().await?;
    runtime::run_all(client, cfg).await
}
