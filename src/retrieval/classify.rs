//! URL classification: which retrieval strategy a URL is expected to need.

use url::Url;

/// Media platforms with a dedicated extraction profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// youtube.com / youtu.be
    YouTube,
    /// open.spotify.com
    Spotify,
    /// deezer.com
    Deezer,
    /// soundcloud.com
    SoundCloud,
    /// bandcamp.com
    Bandcamp,
    /// vimeo.com
    Vimeo,
    /// tiktok.com
    TikTok,
    /// instagram.com
    Instagram,
    /// twitter.com / x.com
    Twitter,
    /// twitch.tv
    Twitch,
    /// dailymotion.com
    Dailymotion,
    /// reddit.com
    Reddit,
    /// pornhub.com
    Pornhub,
    /// xvideos.com
    Xvideos,
    /// xnxx.com
    Xnxx,
}

/// Registrable domains per platform; subdomains of each entry match too
const PLATFORM_DOMAINS: &[(&str, Platform)] = &[
    ("youtube.com", Platform::YouTube),
    ("youtu.be", Platform::YouTube),
    ("youtube-nocookie.com", Platform::YouTube),
    ("spotify.com", Platform::Spotify),
    ("deezer.com", Platform::Deezer),
    ("deezer.page.link", Platform::Deezer),
    ("soundcloud.com", Platform::SoundCloud),
    ("bandcamp.com", Platform::Bandcamp),
    ("vimeo.com", Platform::Vimeo),
    ("tiktok.com", Platform::TikTok),
    ("instagram.com", Platform::Instagram),
    ("twitter.com", Platform::Twitter),
    ("x.com", Platform::Twitter),
    ("twitch.tv", Platform::Twitch),
    ("dailymotion.com", Platform::Dailymotion),
    ("reddit.com", Platform::Reddit),
    ("redd.it", Platform::Reddit),
    ("pornhub.com", Platform::Pornhub),
    ("xvideos.com", Platform::Xvideos),
    ("xnxx.com", Platform::Xnxx),
];

/// Path suffixes treated as directly downloadable files
pub const DIRECT_EXTENSIONS: &[&str] = &[
    // video
    "mp4", "mkv", "webm", "avi", "mov", "m4v", "flv", "wmv", "mpg", "mpeg", "3gp", "ts",
    // audio
    "mp3", "m4a", "aac", "flac", "wav", "ogg", "opus", "wma",
    // image
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "svg",
    // archives and documents
    "zip", "rar", "7z", "tar", "gz", "bz2", "xz", "iso", "apk", "exe", "dmg", "pdf",
];

impl Platform {
    /// Short lowercase identifier used in logs and temp file names
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::YouTube => "youtube",
            Self::Spotify => "spotify",
            Self::Deezer => "deezer",
            Self::SoundCloud => "soundcloud",
            Self::Bandcamp => "bandcamp",
            Self::Vimeo => "vimeo",
            Self::TikTok => "tiktok",
            Self::Instagram => "instagram",
            Self::Twitter => "twitter",
            Self::Twitch => "twitch",
            Self::Dailymotion => "dailymotion",
            Self::Reddit => "reddit",
            Self::Pornhub => "pornhub",
            Self::Xvideos => "xvideos",
            Self::Xnxx => "xnxx",
        }
    }

    /// Human-readable name for status messages
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::Spotify => "Spotify",
            Self::Deezer => "Deezer",
            Self::SoundCloud => "SoundCloud",
            Self::Bandcamp => "Bandcamp",
            Self::Vimeo => "Vimeo",
            Self::TikTok => "TikTok",
            Self::Instagram => "Instagram",
            Self::Twitter => "X (Twitter)",
            Self::Twitch => "Twitch",
            Self::Dailymotion => "Dailymotion",
            Self::Reddit => "Reddit",
            Self::Pornhub => "Pornhub",
            Self::Xvideos => "XVideos",
            Self::Xnxx => "XNXX",
        }
    }

    /// Every known platform
    pub fn all() -> impl Iterator<Item = Self> {
        let mut seen = Vec::new();
        PLATFORM_DOMAINS.iter().filter_map(move |(_, p)| {
            if seen.contains(p) {
                None
            } else {
                seen.push(*p);
                Some(*p)
            }
        })
    }

    /// Domains registered for this platform
    pub fn domains(self) -> impl Iterator<Item = &'static str> {
        PLATFORM_DOMAINS
            .iter()
            .filter(move |(_, p)| *p == self)
            .map(|(d, _)| *d)
    }

    /// Match a host name against the platform table (subdomain tolerant)
    #[must_use]
    pub fn from_host(host: &str) -> Option<Self> {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        PLATFORM_DOMAINS
            .iter()
            .find(|(domain, _)| {
                host == *domain
                    || host
                        .strip_suffix(domain)
                        .is_some_and(|rest| rest.ends_with('.'))
            })
            .map(|(_, p)| *p)
    }

    /// Detect the platform of a URL string
    #[must_use]
    pub fn detect(url: &str) -> Option<Self> {
        let parsed = Url::parse(url.trim()).ok()?;
        Self::from_host(parsed.host_str()?)
    }
}

/// Outcome of classifying a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlClass {
    /// Host belongs to a known media platform
    ExtractorEligible(Platform),
    /// Path ends in a recognized file extension
    DirectLink,
    /// Neither; the router tries the extractor first, then a plain fetch
    Unknown,
}

impl UrlClass {
    /// Short label for logs
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ExtractorEligible(_) => "extractor",
            Self::DirectLink => "direct",
            Self::Unknown => "unknown",
        }
    }
}

/// Classify a URL. Pure and total: malformed input is `Unknown`.
#[must_use]
pub fn classify(url: &str) -> UrlClass {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return UrlClass::Unknown;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return UrlClass::Unknown;
    }
    let Some(host) = parsed.host_str() else {
        return UrlClass::Unknown;
    };

    if let Some(platform) = Platform::from_host(host) {
        return UrlClass::ExtractorEligible(platform);
    }

    if has_direct_extension(parsed.path()) {
        return UrlClass::DirectLink;
    }

    UrlClass::Unknown
}

fn has_direct_extension(path: &str) -> bool {
    let last_segment = path.rsplit('/').next().unwrap_or_default();
    last_segment
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| DIRECT_EXTENSIONS.contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_platform_hosts() {
        assert_eq!(
            classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            UrlClass::ExtractorEligible(Platform::YouTube)
        );
        assert_eq!(
            classify("https://youtu.be/dQw4w9WgXcQ"),
            UrlClass::ExtractorEligible(Platform::YouTube)
        );
        assert_eq!(
            classify("https://open.spotify.com/track/abc"),
            UrlClass::ExtractorEligible(Platform::Spotify)
        );
        assert_eq!(
            classify("https://m.soundcloud.com/artist/track"),
            UrlClass::ExtractorEligible(Platform::SoundCloud)
        );
    }

    #[test]
    fn test_platform_wins_over_extension() {
        assert_eq!(
            classify("https://www.reddit.com/r/videos/clip.mp4"),
            UrlClass::ExtractorEligible(Platform::Reddit)
        );
    }

    #[test]
    fn test_lookalike_hosts_do_not_match() {
        assert_eq!(classify("https://notyoutube.com/watch"), UrlClass::Unknown);
        assert_eq!(classify("https://youtube.com.evil.net/a"), UrlClass::Unknown);
        assert_eq!(classify("https://box.com/file"), UrlClass::Unknown);
    }

    #[test]
    fn test_direct_links() {
        assert_eq!(classify("https://example.com/video.mp4"), UrlClass::DirectLink);
        assert_eq!(
            classify("https://cdn.example.com/a/b/Archive.ZIP?token=1#frag"),
            UrlClass::DirectLink
        );
        assert_eq!(classify("https://example.com/mp4"), UrlClass::Unknown);
        assert_eq!(classify("https://example.com/dir.mp4/page"), UrlClass::Unknown);
    }

    #[test]
    fn test_malformed_is_unknown() {
        assert_eq!(classify(""), UrlClass::Unknown);
        assert_eq!(classify("not a url"), UrlClass::Unknown);
        assert_eq!(classify("ftp://example.com/file.mp4"), UrlClass::Unknown);
        assert_eq!(classify("https://"), UrlClass::Unknown);
    }

    #[test]
    fn test_every_platform_has_a_domain() {
        for platform in Platform::all() {
            assert!(platform.domains().next().is_some(), "{platform:?}");
            assert_eq!(Platform::from_host(platform.domains().next().unwrap_or_default()), Some(platform));
        }
    }

    fn platform_domain() -> impl Strategy<Value = (&'static str, Platform)> {
        proptest::sample::select(PLATFORM_DOMAINS.to_vec())
    }

    fn direct_extension() -> impl Strategy<Value = &'static str> {
        proptest::sample::select(DIRECT_EXTENSIONS.to_vec())
    }

    proptest! {
        #[test]
        fn prop_platform_domains_are_extractor_eligible(
            (domain, platform) in platform_domain(),
            www in any::<bool>(),
            path in "[a-z0-9/]{0,20}",
        ) {
            let prefix = if www { "www." } else { "" };
            let url = format!("https://{prefix}{domain}/{path}");
            prop_assert_eq!(classify(&url), UrlClass::ExtractorEligible(platform));
        }

        #[test]
        fn prop_known_extensions_are_direct(
            ext in direct_extension(),
            name in "[a-z0-9_-]{1,16}",
            upper in any::<bool>(),
        ) {
            let ext = if upper { ext.to_uppercase() } else { ext.to_string() };
            let url = format!("https://files.example.org/pub/{name}.{ext}");
            prop_assert_eq!(classify(&url), UrlClass::DirectLink);
        }

        #[test]
        fn prop_plain_pages_are_unknown(name in "[a-z]{1,16}") {
            let url = format!("https://example.org/articles/{name}");
            prop_assert_eq!(classify(&url), UrlClass::Unknown);
        }
    }
}
