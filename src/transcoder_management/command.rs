//! The fixed ffmpeg argument template.

use std::path::Path;

use crate::configuration::TranscoderConfig;
use crate::session_management::{mask_credentials, SessionId};
use crate::storage::artifact::{playlist_file_name, segment_file_pattern};

/// Builds the ffmpeg arguments for one session.
///
/// Only `source` comes from the client, and it must already have passed
/// [`validate_source`](crate::session_management::validate_source). It is passed as a
/// single argv entry, never through a shell.
pub fn build_args(
    config: &TranscoderConfig,
    output_dir: &Path,
    session_id: &SessionId,
    source: &str,
) -> Vec<String> {
    let segment_path = output_dir.join(segment_file_pattern(session_id));
    let playlist_path = output_dir.join(playlist_file_name(session_id));

    vec![
        "-rtsp_transport".to_string(),
        config.rtsp_transport.clone(),
        "-i".to_string(),
        source.to_string(),
        "-c:v".to_string(),
        config.video_codec.clone(),
        "-preset".to_string(),
        config.preset.clone(),
        "-tune".to_string(),
        config.tune.clone(),
        "-s".to_string(),
        config.resolution.clone(),
        "-r".to_string(),
        config.frame_rate.to_string(),
        "-c:a".to_string(),
        config.audio_codec.clone(),
        "-f".to_string(),
        "hls".to_string(),
        "-hls_time".to_string(),
        config.segment_secs.to_string(),
        "-hls_list_size".to_string(),
        config.playlist_size.to_string(),
        "-hls_flags".to_string(),
        "delete_segments".to_string(),
        "-start_number".to_string(),
        config.start_number.to_string(),
        "-hls_segment_filename".to_string(),
        segment_path.to_string_lossy().into_owned(),
        playlist_path.to_string_lossy().into_owned(),
    ]
}

/// Human-readable command line, for logs. Credentials in URL arguments are masked.
pub fn command_line(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        if arg.contains("://") {
            line.push_str(&mask_credentials(arg));
        } else {
            line.push_str(arg);
        }
    }
    line
}
