use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser, Clone)]
#[command(name = "scribe")]
#[command(about = "Terminal audio player for transcription work")]
pub struct Cli {
    /// Start playing this file right away.
    pub file: Option<PathBuf>,

    /// Directory the browser opens in.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Override settings file path.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log file path.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Run without an audio device; position follows the wall clock.
    #[arg(long)]
    pub no_audio: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_and_flags() {
        let cli = Cli::parse_from(["scribe", "memo.wav", "--no-audio", "--dir", "/tmp"]);
        assert_eq!(cli.file, Some(PathBuf::from("memo.wav")));
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp")));
        assert!(cli.no_audio);
        assert!(cli.config.is_none());
    }
}
