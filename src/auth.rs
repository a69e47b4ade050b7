//! Connection establishment.
//!
//! This is the whole credential story as far as the chain core cares:
//! something that produces a live TDS client. Windows-integrated auth is the
//! default; SQL auth kicks in when a username is supplied.

use anyhow::{Context, Result};
use async_std::net::TcpStream;
use log::{debug, info};
use tiberius::{AuthMethod, Client, Config};

#[derive(Debug, Clone)]
pub enum Credentials {
    /// SSPI/GSSAPI as the current process identity.
    Integrated,
    /// SQL Server login and password.
    Sql { username: String, password: String },
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub credentials: Credentials,
}

pub async fn connect(options: &ConnectOptions) -> Result<Client<TcpStream>> {
    let mut config = Config::new();
    config.host(&options.host);
    config.port(options.port);
    config.database(&options.database);
    config.trust_cert();

    match &options.credentials {
        Credentials::Integrated => {
            debug!("authenticating with the current process identity");
            config.authentication(AuthMethod::Integrated);
        }
        Credentials::Sql { username, password } => {
            debug!("authenticating as SQL login '{username}'");
            config.authentication(AuthMethod::sql_server(username, password));
        }
    }

    let tcp = TcpStream::connect(config.get_addr())
        .await
        .with_context(|| format!("tcp connect to {}:{} failed", options.host, options.port))?;
    tcp.set_nodelay(true)?;

    let client = Client::connect(config, tcp)
        .await
        .with_context(|| format!("TDS handshake with {} failed", options.host))?;
    info!("connected to {}:{}/{}", options.host, options.port, options.database);

    Ok(client)
}
