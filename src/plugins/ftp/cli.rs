use crate::plugins::registry::{CliPlugin, DownloadCliConfig};
use clap::{Arg, ArgMatches, Command};

pub struct FtpCliPlugin;

impl FtpCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for FtpCliPlugin {
    fn name(&self) -> &'static str {
        "ftp"
    }

    fn augment_download_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("ftp_user")
                .long("ftp-user")
                .help_heading("FTP")
                .help("FTP username (default: anonymous)")
                .num_args(1),
        )
        .arg(
            Arg::new("ftp_pass")
                .long("ftp-pass")
                .help_heading("FTP")
                .help("FTP password")
                .num_args(1),
        )
        .arg(
            Arg::new("ftp_port")
                .long("ftp-port")
                .help_heading("FTP")
                .help("FTP port (default: from url, else 21)")
                .num_args(1),
        )
    }

    // Options travel with each task and reach FtpDriver through the merged context.
    fn apply_download_matches(&self, matches: &ArgMatches, cfg: &mut DownloadCliConfig) -> anyhow::Result<()> {
        for key in ["ftp_user", "ftp_pass", "ftp_port"] {
            if let Some(v) = matches.get_one::<String>(key) {
                cfg.options.insert(key.to_string(), v.clone());
            }
        }
        if let Some(port) = cfg.options.get("ftp_port") {
            port.parse::<u16>()
                .map_err(|_| anyhow::anyhow!("invalid ftp port: {}", port))?;
        }
        Ok(())
    }
}
