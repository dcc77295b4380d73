//! Fingerprint randomisation for stealth page loads.
//!
//! A [`StealthProfile`] is drawn once per load from fixed pools of common
//! desktop values. Its scripts run before any page script so the spoofed
//! navigator/WebGL surface is in place when detection code looks.

use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;

/// User agents of current desktop Chrome builds.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
];

/// Common desktop viewport sizes.
pub const VIEWPORTS: &[(u32, u32)] = &[
    (1920, 1080),
    (1680, 1050),
    (1536, 864),
    (1440, 900),
    (1366, 768),
];

/// IANA timezones.
pub const TIMEZONES: &[&str] = &[
    "America/New_York",
    "America/Chicago",
    "America/Los_Angeles",
    "Europe/London",
    "Europe/Berlin",
];

/// `Accept-Language` / `navigator.languages` sets.
pub const LANGUAGES: &[&[&str]] = &[&["en-US", "en"], &["en-GB", "en"], &["en-US"]];

/// Values reported by `navigator.hardwareConcurrency`.
pub const HARDWARE_CONCURRENCY: &[u32] = &[4, 8, 12, 16];

/// WebGL `(vendor, renderer)` pairs.
pub const WEBGL_VENDORS: &[(&str, &str)] = &[
    ("Intel Inc.", "Intel Iris OpenGL Engine"),
    ("Google Inc. (NVIDIA)", "ANGLE (NVIDIA, NVIDIA GeForce GTX 1660 Direct3D11 vs_5_0 ps_5_0)"),
    ("Google Inc. (AMD)", "ANGLE (AMD, AMD Radeon RX 580 Direct3D11 vs_5_0 ps_5_0)"),
    ("Apple Inc.", "Apple M1"),
];

/// Base pre-navigation delay.
pub const BASE_DELAY_MS: u64 = 500;

/// Maximum deviation from [`BASE_DELAY_MS`] in either direction.
pub const DELAY_JITTER_MS: u64 = 300;

/// One randomised browser identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealthProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub timezone: String,
    pub languages: Vec<String>,
    pub hardware_concurrency: u32,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
}

impl StealthProfile {
    /// Draws a profile from the pools.
    #[must_use]
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let (webgl_vendor, webgl_renderer) =
            *WEBGL_VENDORS.choose(&mut rng).unwrap_or(&WEBGL_VENDORS[0]);

        Self {
            user_agent: (*USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0])).to_owned(),
            viewport: *VIEWPORTS.choose(&mut rng).unwrap_or(&VIEWPORTS[0]),
            timezone: (*TIMEZONES.choose(&mut rng).unwrap_or(&TIMEZONES[0])).to_owned(),
            languages: LANGUAGES
                .choose(&mut rng)
                .unwrap_or(&LANGUAGES[0])
                .iter()
                .map(|l| (*l).to_owned())
                .collect(),
            hardware_concurrency: *HARDWARE_CONCURRENCY
                .choose(&mut rng)
                .unwrap_or(&HARDWARE_CONCURRENCY[0]),
            webgl_vendor: webgl_vendor.to_owned(),
            webgl_renderer: webgl_renderer.to_owned(),
        }
    }

    /// `Accept-Language` header value, e.g. `en-US,en;q=0.9`.
    #[must_use]
    pub fn accept_language(&self) -> String {
        self.languages
            .iter()
            .enumerate()
            .map(|(i, lang)| {
                if i == 0 {
                    lang.clone()
                } else {
                    format!("{lang};q=0.9")
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Scripts to evaluate on every new document, in order.
    #[must_use]
    pub fn scripts(&self) -> Vec<String> {
        let languages = self
            .languages
            .iter()
            .map(|l| format!("'{l}'"))
            .collect::<Vec<_>>()
            .join(", ");

        vec![
            // webdriver
            r"Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });"
                .to_owned(),
            r"window.chrome = { runtime: {}, loadTimes: function() {}, csi: function() {}, app: {} };"
                .to_owned(),
            r"Object.defineProperty(navigator, 'plugins', {
                get: () => [
                    { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
                    { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' },
                    { name: 'Native Client', filename: 'internal-nacl-plugin', description: '' }
                ],
                configurable: true
            });"
            .to_owned(),
            format!(
                "Object.defineProperty(navigator, 'languages', {{ get: () => [{languages}], configurable: true }});"
            ),
            format!(
                "Object.defineProperty(navigator, 'hardwareConcurrency', {{ get: () => {}, configurable: true }});",
                self.hardware_concurrency
            ),
            // canvas noise: flip the low bit of a few pixels before export
            r"(() => {
                const toDataURL = HTMLCanvasElement.prototype.toDataURL;
                HTMLCanvasElement.prototype.toDataURL = function(...args) {
                    const ctx = this.getContext('2d');
                    if (ctx && this.width > 0 && this.height > 0) {
                        const img = ctx.getImageData(0, 0, Math.min(this.width, 4), 1);
                        for (let i = 0; i < img.data.length; i += 4) {
                            img.data[i] = img.data[i] ^ 1;
                        }
                        ctx.putImageData(img, 0, 0);
                    }
                    return toDataURL.apply(this, args);
                };
            })();"
                .to_owned(),
            format!(
                "(() => {{
                    const getParameter = WebGLRenderingContext.prototype.getParameter;
                    WebGLRenderingContext.prototype.getParameter = function(parameter) {{
                        if (parameter === 37445) return '{}';
                        if (parameter === 37446) return '{}';
                        return getParameter.call(this, parameter);
                    }};
                }})();",
                self.webgl_vendor, self.webgl_renderer
            ),
        ]
    }
}

/// Jittered pre-navigation delay: `BASE_DELAY_MS ± DELAY_JITTER_MS`.
#[must_use]
pub fn random_delay() -> Duration {
    let low = BASE_DELAY_MS - DELAY_JITTER_MS;
    let high = BASE_DELAY_MS + DELAY_JITTER_MS;
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_values_come_from_pools() {
        for _ in 0..20 {
            let profile = StealthProfile::random();
            assert!(USER_AGENTS.contains(&profile.user_agent.as_str()));
            assert!(VIEWPORTS.contains(&profile.viewport));
            assert!(TIMEZONES.contains(&profile.timezone.as_str()));
            assert!(HARDWARE_CONCURRENCY.contains(&profile.hardware_concurrency));
        }
    }

    #[test]
    fn delay_stays_within_jitter() {
        for _ in 0..50 {
            let ms = random_delay().as_millis();
            assert!((200..=800).contains(&ms));
        }
    }

    #[test]
    fn scripts_embed_profile() {
        let profile = StealthProfile::random();
        let scripts = profile.scripts().join("\n");
        assert!(scripts.contains("webdriver"));
        assert!(scripts.contains(&profile.webgl_vendor));
        assert!(scripts.contains(&profile.hardware_concurrency.to_string()));
    }

    #[test]
    fn accept_language_weights_secondary_languages() {
        let profile = StealthProfile {
            languages: vec!["en-US".to_owned(), "en".to_owned()],
            ..StealthProfile::random()
        };
        assert_eq!(profile.accept_language(), "en-US,en;q=0.9");
    }
}
