use clap::{Args, Subcommand, ValueEnum};
use connectors::sql::postgres::config::{SslMode, TargetConfig};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the SQL target and print its server version
    TestConn {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show the target table layout and the statements generated for it
    Inspect {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(
            long = "origin-type",
            help = "Origin column type to map onto a target type, may be repeated"
        )]
        origin_types: Vec<String>,

        #[arg(
            long = "constant",
            value_parser = parse_constant,
            help = "Constant column as COLUMN=LITERAL, may be repeated"
        )]
        constants: Vec<(String, String)>,

        #[arg(long, help = "Prints the table layout as JSON instead of a table")]
        json: bool,
    },
    /// Divide a token range into contiguous partitions
    Split {
        #[arg(long, default_value = "-9223372036854775808", allow_hyphen_values = true)]
        min: String,

        #[arg(long, default_value = "9223372036854775807", allow_hyphen_values = true)]
        max: String,

        #[arg(long, help = "Number of partitions")]
        parts: usize,

        #[arg(long, help = "Prints the ranges as JSON instead of one per line")]
        json: bool,
    },
    /// List the tracked partition status of a run
    Runs {
        #[arg(long, help = "Run ID to inspect")]
        run: String,

        #[arg(long, help = "Run state directory, defaults to ~/.partition-migrator/runs")]
        state_dir: Option<PathBuf>,

        #[arg(long, help = "Prints the entries as JSON instead of a table")]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SslArg {
    Disable,
    Prefer,
    Require,
}

impl From<SslArg> for SslMode {
    fn from(arg: SslArg) -> Self {
        match arg {
            SslArg::Disable => SslMode::Disable,
            SslArg::Prefer => SslMode::Prefer,
            SslArg::Require => SslMode::Require,
        }
    }
}

#[derive(Args)]
pub struct TargetArgs {
    #[arg(long, default_value = "localhost")]
    pub host: String,

    #[arg(long, default_value_t = 5433)]
    pub port: u16,

    #[arg(long, default_value = "yugabyte")]
    pub database: String,

    #[arg(long, default_value = "yugabyte")]
    pub user: String,

    #[arg(long)]
    pub password: Option<String>,

    #[arg(long, default_value = "public")]
    pub schema: String,

    #[arg(long, default_value = "")]
    pub table: String,

    #[arg(long, value_enum, default_value = "prefer")]
    pub ssl_mode: SslArg,
}

impl TargetArgs {
    pub fn to_config(&self) -> TargetConfig {
        TargetConfig::default()
            .with_host(&self.host, self.port)
            .with_database(&self.database)
            .with_credentials(&self.user, self.password.as_deref())
            .with_table(&self.schema, &self.table)
            .with_ssl_mode(self.ssl_arg())
    }

    fn ssl_arg(&self) -> SslMode {
        self.ssl_mode.into()
    }
}

fn parse_constant(raw: &str) -> Result<(String, String), String> {
    let (column, literal) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=LITERAL, got '{raw}'"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("missing column name in '{raw}'"));
    }
    Ok((column.to_string(), literal.to_string()))
}
