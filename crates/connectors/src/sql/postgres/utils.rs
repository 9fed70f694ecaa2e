use crate::sql::{base::error::ConnectorError, postgres::config::TargetConfig};
use native_tls::{Certificate, TlsConnector};
use postgres_native_tls::MakeTlsConnector;
use std::path::Path;
use tokio_postgres::{Client, Config, NoTls, config::SslMode};
use tracing::{error, warn};

pub async fn connect_client(url: &str) -> Result<Client, ConnectorError> {
    let config = url
        .parse::<Config>()
        .map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;
    connect(config, None).await
}

pub async fn connect_target(settings: &TargetConfig) -> Result<Client, ConnectorError> {
    connect(settings.to_pg_config(), settings.ssl_root_cert.as_deref()).await
}

async fn connect(config: Config, root_cert: Option<&Path>) -> Result<Client, ConnectorError> {
    match config.get_ssl_mode() {
        SslMode::Disable => connect_without_tls(config).await,
        SslMode::Prefer => match connect_with_tls(config.clone(), root_cert).await {
            Ok(client) => Ok(client),
            Err(error) => {
                warn!(%error, "Postgres TLS handshake failed, retrying without TLS");
                connect_without_tls(config).await
            }
        },
        _ => connect_with_tls(config, root_cert).await,
    }
}

async fn connect_with_tls(config: Config, root_cert: Option<&Path>) -> Result<Client, ConnectorError> {
    let mut builder = TlsConnector::builder();
    if let Some(path) = root_cert {
        let pem = std::fs::read(path)?;
        builder.add_root_certificate(Certificate::from_pem(&pem)?);
    }
    let tls = MakeTlsConnector::new(builder.build()?);
    let (client, connection) = config.connect(tls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}

async fn connect_without_tls(config: Config) -> Result<Client, ConnectorError> {
    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}
