//! mitm-certgen - bootstrap and issue certificates for TLS interception

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use mitm_certs::{
    generate_root_ca, issue_client_certificate, issue_server_certificate, resign,
    write_leaf, CertificateAuthority, CertificatePool, Encoding, HostIdentitySet,
    KeyCertMaterial, LeafOutput, LeafRequest, PoolConfig, DEFAULT_CA_COMMON_NAME,
    DEFAULT_CA_SERIAL, DEFAULT_LEAF_SERIAL,
};

#[derive(Parser, Debug)]
#[command(name = "mitm-certgen")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a self-signed root CA and write its certificate and key
    RootCa {
        #[arg(long = "out-cert")]
        out_cert: PathBuf,
        #[arg(long = "out-key")]
        out_key: PathBuf,
        #[arg(long, default_value_t = DEFAULT_CA_SERIAL)]
        serial: u64,
        #[arg(long = "common-name", default_value = DEFAULT_CA_COMMON_NAME)]
        common_name: String,
        /// Encrypt the written CA key with this passphrase
        #[arg(long = "key-passphrase", env = "MITM_CA_KEY_PASSPHRASE")]
        key_passphrase: Option<String>,
    },
    /// Issue a server certificate signed by the CA
    ServerCert(LeafArgs),
    /// Issue a client certificate signed by the CA
    ClientCert(LeafArgs),
    /// Bundle a certificate and private key into a PKCS#12 archive
    Pkcs12 {
        #[arg(long)]
        cert: PathBuf,
        #[arg(long)]
        key: PathBuf,
        #[arg(long = "key-passphrase")]
        key_passphrase: Option<String>,
        #[arg(long)]
        out: PathBuf,
        #[arg(long = "export-passphrase", env = "MITM_PKCS12_PASSPHRASE")]
        export_passphrase: String,
    },
    /// Re-sign an existing certificate under another CA
    Resign {
        #[command(flatten)]
        ca: CaArgs,
        #[arg(long)]
        cert: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Look up (or issue) the pooled certificate for a host
    Host {
        /// JSON pool configuration file
        #[arg(short = 'c', long = "config", env = "MITM_CERTS_CONFIG")]
        config: PathBuf,
        #[arg(long = "dns")]
        dns_names: Vec<String>,
        #[arg(long = "ip")]
        ip_addrs: Vec<String>,
        #[arg(long = "common-name")]
        common_name: Option<String>,
    },
}

#[derive(Args, Debug)]
struct CaArgs {
    #[arg(long = "ca-cert")]
    ca_cert: PathBuf,
    #[arg(long = "ca-key")]
    ca_key: PathBuf,
    #[arg(long = "ca-key-passphrase", env = "MITM_CA_KEY_PASSPHRASE")]
    ca_key_passphrase: Option<String>,
}

impl CaArgs {
    fn load(&self) -> Result<CertificateAuthority> {
        CertificateAuthority::load(
            &self.ca_cert,
            &self.ca_key,
            self.ca_key_passphrase.as_deref(),
        )
        .with_context(|| format!("Failed to load CA from {}", self.ca_cert.display()))
    }
}

#[derive(Args, Debug)]
struct LeafArgs {
    #[command(flatten)]
    ca: CaArgs,
    #[arg(long = "dns")]
    dns_names: Vec<String>,
    #[arg(long = "ip")]
    ip_addrs: Vec<String>,
    #[arg(long = "common-name")]
    common_name: Option<String>,
    #[arg(long, default_value_t = DEFAULT_LEAF_SERIAL)]
    serial: u64,
    #[arg(long = "out-cert")]
    out_cert: Option<PathBuf>,
    #[arg(long = "out-key")]
    out_key: Option<PathBuf>,
    /// Append the CA certificate after the leaf in the certificate file
    #[arg(long = "include-ca")]
    include_ca: bool,
}

impl LeafArgs {
    fn request(&self) -> LeafRequest {
        let request = LeafRequest::new(self.dns_names.iter().cloned(), self.ip_addrs.iter().cloned())
            .with_serial(self.serial);
        match &self.common_name {
            Some(common_name) => request.with_common_name(common_name.as_str()),
            None => request,
        }
    }

    fn output(&self) -> Result<LeafOutput> {
        if self.out_cert.is_none() && self.out_key.is_none() {
            bail!("at least one of --out-cert or --out-key is required");
        }
        Ok(LeafOutput {
            cert_path: self.out_cert.clone(),
            key_path: self.out_key.clone(),
            include_ca: self.include_ca,
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::RootCa {
            out_cert,
            out_key,
            serial,
            common_name,
            key_passphrase,
        } => root_ca(&out_cert, &out_key, serial, &common_name, key_passphrase.as_deref()),
        Commands::ServerCert(args) => leaf(&args, false),
        Commands::ClientCert(args) => leaf(&args, true),
        Commands::Pkcs12 {
            cert,
            key,
            key_passphrase,
            out,
            export_passphrase,
        } => pkcs12(&cert, &key, key_passphrase.as_deref(), &out, &export_passphrase),
        Commands::Resign { ca, cert, out } => resign_file(&ca, &cert, &out),
        Commands::Host {
            config,
            dns_names,
            ip_addrs,
            common_name,
        } => host(&config, dns_names, ip_addrs, common_name.as_deref()),
    }
}

fn init_tracing(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn root_ca(
    out_cert: &Path,
    out_key: &Path,
    serial: u64,
    common_name: &str,
    key_passphrase: Option<&str>,
) -> Result<()> {
    let ca = generate_root_ca(common_name, serial).context("Failed to generate root CA")?;
    ca.save(out_cert, out_key, key_passphrase)
        .context("Failed to write root CA")?;
    info!(
        cert = %out_cert.display(),
        key = %out_key.display(),
        encrypted = key_passphrase.is_some(),
        "root CA written"
    );
    Ok(())
}

fn leaf(args: &LeafArgs, client: bool) -> Result<()> {
    let output = args.output()?;
    let ca = args.ca.load()?;
    let request = args.request();
    let issued = if client {
        issue_client_certificate(&ca, &request).context("Failed to issue client certificate")?
    } else {
        issue_server_certificate(&ca, &request).context("Failed to issue server certificate")?
    };
    write_leaf(&ca, &issued, &output).context("Failed to write certificate")?;

    if let Some(cert_path) = &output.cert_path {
        println!("{}", cert_path.display());
    }
    if let Some(key_path) = &output.key_path {
        println!("{}", key_path.display());
    }
    Ok(())
}

fn pkcs12(
    cert: &Path,
    key: &Path,
    key_passphrase: Option<&str>,
    out: &Path,
    export_passphrase: &str,
) -> Result<()> {
    let material = KeyCertMaterial::load_from_files(cert, key, key_passphrase)
        .context("Failed to load certificate and key")?;
    material
        .save_pkcs12(out, export_passphrase)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    info!(out = %out.display(), "PKCS#12 archive written");
    Ok(())
}

fn resign_file(ca: &CaArgs, cert: &Path, out: &Path) -> Result<()> {
    let ca = ca.load()?;
    let mut target = KeyCertMaterial::default();
    target
        .load_certificate(cert, Encoding::Pem)
        .with_context(|| format!("Failed to load {}", cert.display()))?;
    resign(&ca.to_material(), &mut target).context("Failed to re-sign certificate")?;
    target
        .save_certificate(out, Encoding::Pem)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    info!(out = %out.display(), "certificate re-signed");
    Ok(())
}

fn host(
    config_path: &Path,
    dns_names: Vec<String>,
    ip_addrs: Vec<String>,
    common_name: Option<&str>,
) -> Result<()> {
    let config = PoolConfig::from_json_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let pool = CertificatePool::from_config(&config).context("Failed to build certificate pool")?;
    let identities = HostIdentitySet::new(dns_names, ip_addrs);
    let pooled = pool
        .lookup(&identities, common_name)
        .context("Failed to obtain host certificate")?;

    info!(
        cert_id = %pooled.record.cert_id,
        cache = pooled.cache_status.as_str(),
        "host certificate ready"
    );
    println!("{}", pooled.record.cert_path.display());
    println!("{}", pooled.record.key_path.display());
    Ok(())
}
