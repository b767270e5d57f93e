use clap::Parser;
use rotolapse::video::BackendKind;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Video files, folders of videos, stream URLs or capture device indices
    /// [default: videos in the last used folder]
    pub inputs: Vec<String>,

    /// Disable the output display. Gives a slight speed boost & prevents pop-up interruptions
    #[arg(short = 'd', long = "no-display")]
    pub no_display: bool,

    /// File extension of recorded videos (.avi, .mp4, .mkv, etc.) [default: from recording_settings.json]
    #[arg(short = 'x', long)]
    pub extension: Option<String>,

    /// FourCC code used for recording (X264, XVID, MJPG, mp4v, etc.) [default: from recording_settings.json]
    #[arg(short = 'c', long)]
    pub codec: Option<String>,

    /// Number of counter-clockwise 90 degree rotations [default: from selection_history.json]
    #[arg(short = 'r', long, allow_negative_numbers = true)]
    pub rotations: Option<i32>,

    /// Time-lapse factor, any positive real number [default: from selection_history.json]
    #[arg(short = 't', long)]
    pub timelapse: Option<f64>,

    /// Scaling factor applied after rotation [default: from selection_history.json]
    #[arg(short = 's', long)]
    pub scale: Option<f64>,

    /// Upper limit for the recording frame rate [default: source frame rate]
    #[arg(long, env = "ROTOLAPSE_MAX_FPS")]
    pub max_fps: Option<f64>,

    /// Encoder quality in percent, if the codec supports it
    #[arg(long)]
    pub quality: Option<f64>,

    /// Capture backend (opencv or ffmpeg)
    #[arg(long, env = "ROTOLAPSE_BACKEND", default_value_t = BackendKind::Opencv)]
    pub backend: BackendKind,

    /// Root directory for recordings [default: next to each source]
    #[arg(long, env = "ROTOLAPSE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Directory holding recording_settings.json and selection_history.json
    #[arg(long, env = "ROTOLAPSE_SETTINGS_DIR", default_value = ".")]
    pub settings_dir: PathBuf,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "rotolapse", "-d", "-x", "mp4", "-c", "XVID", "-r", "-1", "-t", "2.5", "--backend",
            "ffmpeg", "clip.mp4", "0",
        ])
        .unwrap();
        assert!(args.no_display);
        assert_eq!(args.extension.as_deref(), Some("mp4"));
        assert_eq!(args.rotations, Some(-1));
        assert_eq!(args.timelapse, Some(2.5));
        assert_eq!(args.backend, BackendKind::Ffmpeg);
        assert_eq!(args.inputs, vec!["clip.mp4", "0"]);
        assert_eq!(args.scale, None);
    }

    #[test]
    fn test_inputs_optional() {
        let args = Args::try_parse_from(["rotolapse", "--settings-dir", "/tmp"]).unwrap();
        assert!(args.inputs.is_empty());
        assert_eq!(args.settings_dir, PathBuf::from("/tmp"));
        assert!(!args.no_display);
    }
}
