use std::{fmt, str::FromStr};

use thiserror::Error;

/// Loudness normalization stage shared by every preset.
const LOUDNORM: &str = "loudnorm=I=-16:TP=-1.5:LRA=11";

/// Output profile shared by every preset.
pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u32 = 2;

/// One peaking equalizer band, in ffmpeg `equalizer` terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub frequency: u32,
    pub width: u32,
    pub gain: i32,
}

const fn band(frequency: u32, width: u32, gain: i32) -> Band {
    Band {
        frequency,
        width,
        gain,
    }
}

/// Named audio-processing profile applied to the next stream of a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EqPreset {
    Default,
    BassBoost,
    #[default]
    Enhanced,
    VocalBoost,
    TrebleBoost,
    Cinema,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown EQ preset '{0}'")]
pub struct UnknownPreset(pub String);

impl EqPreset {
    pub const ALL: [EqPreset; 6] = [
        EqPreset::Default,
        EqPreset::BassBoost,
        EqPreset::Enhanced,
        EqPreset::VocalBoost,
        EqPreset::TrebleBoost,
        EqPreset::Cinema,
    ];

    /// Identifier used in slash-command choices and button ids.
    pub fn key(self) -> &'static str {
        match self {
            EqPreset::Default => "default",
            EqPreset::BassBoost => "bass_boost",
            EqPreset::Enhanced => "enhanced",
            EqPreset::VocalBoost => "vocal_boost",
            EqPreset::TrebleBoost => "treble_boost",
            EqPreset::Cinema => "cinema",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EqPreset::Default => "🎵 Default",
            EqPreset::BassBoost => "🔊 Bass Boost",
            EqPreset::Enhanced => "✨ Enhanced",
            EqPreset::VocalBoost => "🎤 Vocal Boost",
            EqPreset::TrebleBoost => "🔔 Treble Boost",
            EqPreset::Cinema => "🎬 Cinema",
        }
    }

    pub fn tagline(self) -> &'static str {
        match self {
            EqPreset::Default => "Balanced sound",
            EqPreset::BassBoost => "Enhanced low frequencies",
            EqPreset::Enhanced => "Full range with bass boost",
            EqPreset::VocalBoost => "Clear vocals",
            EqPreset::TrebleBoost => "Crisp highs",
            EqPreset::Cinema => "Movie-like sound",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            EqPreset::Default => "Balanced audio with loudness normalization only",
            EqPreset::BassBoost => "Boosts 60Hz and 170Hz frequencies for deeper bass",
            EqPreset::Enhanced => "Bass boost + vocal clarity + loudness normalization",
            EqPreset::VocalBoost => "Enhances 1kHz and 3kHz for clearer vocals",
            EqPreset::TrebleBoost => "Boosts 4kHz and 8kHz for crisp high frequencies",
            EqPreset::Cinema => "Bass boost with mid scoop and treble enhancement",
        }
    }

    /// Target encoder bitrate in kbit/s.
    pub fn bitrate_kbps(self) -> u32 {
        match self {
            EqPreset::Enhanced | EqPreset::Cinema => 320,
            _ => 256,
        }
    }

    pub fn bands(self) -> &'static [Band] {
        const BASS_BOOST: [Band; 2] = [band(60, 50, 5), band(170, 50, 3)];
        const ENHANCED: [Band; 5] = [
            band(60, 50, 6),
            band(170, 50, 4),
            band(350, 50, 2),
            band(3000, 100, 2),
            band(6000, 100, 1),
        ];
        const VOCAL_BOOST: [Band; 2] = [band(1000, 200, 3), band(3000, 200, 2)];
        const TREBLE_BOOST: [Band; 2] = [band(4000, 100, 3), band(8000, 100, 4)];
        const CINEMA: [Band; 4] = [
            band(60, 50, 4),
            band(170, 50, 2),
            band(1000, 200, -1),
            band(6000, 100, 2),
        ];

        match self {
            EqPreset::Default => &[],
            EqPreset::BassBoost => &BASS_BOOST,
            EqPreset::Enhanced => &ENHANCED,
            EqPreset::VocalBoost => &VOCAL_BOOST,
            EqPreset::TrebleBoost => &TREBLE_BOOST,
            EqPreset::Cinema => &CINEMA,
        }
    }

    /// ffmpeg `-af` filter chain: bands in order, then loudness normalization.
    pub fn filter_chain(self) -> String {
        let mut stages: Vec<String> = self
            .bands()
            .iter()
            .map(|b| {
                format!(
                    "equalizer=f={}:width_type=h:width={}:g={}",
                    b.frequency, b.width, b.gain
                )
            })
            .collect();
        stages.push(LOUDNORM.to_string());
        stages.join(",")
    }

    /// Output-side ffmpeg arguments for this profile.
    pub fn ffmpeg_output_args(self) -> Vec<String> {
        vec![
            "-vn".to_string(),
            "-ar".to_string(),
            SAMPLE_RATE.to_string(),
            "-ac".to_string(),
            CHANNELS.to_string(),
            "-b:a".to_string(),
            format!("{}k", self.bitrate_kbps()),
            "-af".to_string(),
            self.filter_chain(),
        ]
    }
}

impl fmt::Display for EqPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EqPreset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        EqPreset::ALL
            .into_iter()
            .find(|p| p.key() == wanted)
            .ok_or(UnknownPreset(s.to_string()))
    }
}
