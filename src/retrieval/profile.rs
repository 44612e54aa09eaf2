//! Static extraction profiles per platform.

use super::classify::Platform;

/// Audio post-processing: extract the audio track and transcode it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioExtraction {
    /// Target codec passed to `--audio-format`
    pub codec: &'static str,
    /// Target bitrate passed to `--audio-quality`
    pub bitrate: &'static str,
}

/// Extraction options tuned for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformProfile {
    /// yt-dlp format selector
    pub format: &'static str,
    /// Container used when video and audio streams are merged
    pub merge_output_format: Option<&'static str>,
    /// Audio-only extraction, for music platforms
    pub audio: Option<AudioExtraction>,
    /// Age limit declared to the extractor
    pub age_limit: Option<u8>,
}

const MP3_320: AudioExtraction = AudioExtraction {
    codec: "mp3",
    bitrate: "320K",
};

const AUDIO_PROFILE: PlatformProfile = PlatformProfile {
    format: "bestaudio/best",
    merge_output_format: None,
    audio: Some(MP3_320),
    age_limit: None,
};

const YOUTUBE_PROFILE: PlatformProfile = PlatformProfile {
    format: "bestvideo[ext=mp4][height<=1080]+bestaudio[ext=m4a]/best[ext=mp4]/best",
    merge_output_format: Some("mp4"),
    audio: None,
    age_limit: None,
};

const VIDEO_PROFILE: PlatformProfile = PlatformProfile {
    format: "bestvideo[height<=1080]+bestaudio/best[height<=1080]/best",
    merge_output_format: Some("mp4"),
    audio: None,
    age_limit: None,
};

const ADULT_1080_PROFILE: PlatformProfile = PlatformProfile {
    format: "best[height<=1080]",
    merge_output_format: None,
    audio: None,
    age_limit: Some(18),
};

const ADULT_BEST_PROFILE: PlatformProfile = PlatformProfile {
    format: "best",
    merge_output_format: None,
    audio: None,
    age_limit: Some(18),
};

impl PlatformProfile {
    /// Profile for a platform
    #[must_use]
    pub const fn for_platform(platform: Platform) -> &'static Self {
        match platform {
            Platform::YouTube => &YOUTUBE_PROFILE,
            Platform::Spotify | Platform::Deezer | Platform::SoundCloud | Platform::Bandcamp => {
                &AUDIO_PROFILE
            }
            Platform::Pornhub => &ADULT_1080_PROFILE,
            Platform::Xvideos | Platform::Xnxx => &ADULT_BEST_PROFILE,
            Platform::Vimeo
            | Platform::TikTok
            | Platform::Instagram
            | Platform::Twitter
            | Platform::Twitch
            | Platform::Dailymotion
            | Platform::Reddit => &VIDEO_PROFILE,
        }
    }

    /// Whether the platform only ever yields audio
    #[must_use]
    pub const fn is_audio(&self) -> bool {
        self.audio.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_music_platforms_extract_mp3() {
        for platform in [
            Platform::Spotify,
            Platform::Deezer,
            Platform::SoundCloud,
            Platform::Bandcamp,
        ] {
            let profile = PlatformProfile::for_platform(platform);
            assert!(profile.is_audio(), "{platform:?}");
            assert_eq!(profile.audio, Some(MP3_320));
        }
    }

    #[test]
    fn test_adult_platforms_declare_age_limit() {
        for platform in [Platform::Pornhub, Platform::Xvideos, Platform::Xnxx] {
            assert_eq!(PlatformProfile::for_platform(platform).age_limit, Some(18));
        }
        assert_eq!(PlatformProfile::for_platform(Platform::YouTube).age_limit, None);
    }

    #[test]
    fn test_youtube_caps_resolution() {
        let profile = PlatformProfile::for_platform(Platform::YouTube);
        assert!(profile.format.contains("height<=1080"));
        assert_eq!(profile.merge_output_format, Some("mp4"));
    }
}
