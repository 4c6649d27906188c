//! Alarm sinks: where siren effects end up.

use anyhow::{anyhow, Context};
use log::{debug, info};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::engine::alarm::AlarmSink;
use crate::models::config::AlarmConfig;
use crate::models::siren::SirenLevel;

/// Coloured siren banner on stderr
pub struct ConsoleSink {
    choice: ColorChoice,
}

impl ConsoleSink {
    pub fn new(choice: ColorChoice) -> Self {
        Self { choice }
    }

    fn color_for(level: SirenLevel) -> Color {
        match level {
            SirenLevel::High => Color::Red,
            SirenLevel::Suspicious => Color::Yellow,
            SirenLevel::Safe => Color::Green,
        }
    }
}

impl AlarmSink for ConsoleSink {
    fn play_alert(&self, level: SirenLevel) -> anyhow::Result<()> {
        // The all-clear signal is not worth a banner
        if level == SirenLevel::Safe {
            return Ok(());
        }

        let mut stream = StandardStream::stderr(self.choice);
        stream.set_color(ColorSpec::new().set_fg(Some(Self::color_for(level))).set_bold(true))?;
        write!(stream, "[SIREN]")?;
        stream.reset()?;
        writeln!(
            stream,
            " {} traffic detected at {}",
            level.as_str().to_uppercase(),
            chrono::Local::now().format("%H:%M:%S")
        )?;
        Ok(())
    }
}

/// Plays a sound file per level through an external player command
pub struct CommandSink {
    program: String,
    args: Vec<String>,
    sounds: [Option<PathBuf>; SirenLevel::COUNT],
}

impl CommandSink {
    /// `player` is a command line such as `"mpg123 -q"`; the sound path is appended
    pub fn new(player: &str, config: &AlarmConfig) -> Option<Self> {
        let mut parts = player.split_whitespace().map(String::from);
        let program = parts.next()?;
        let sounds = [SirenLevel::Safe, SirenLevel::Suspicious, SirenLevel::High]
            .map(|level| config.sound_for(level).cloned());
        Some(Self {
            program,
            args: parts.collect(),
            sounds,
        })
    }

    fn sound_for(&self, level: SirenLevel) -> Option<&Path> {
        self.sounds[level.index()].as_deref()
    }
}

impl AlarmSink for CommandSink {
    fn play_alert(&self, level: SirenLevel) -> anyhow::Result<()> {
        let sound = match self.sound_for(level) {
            Some(sound) => sound,
            None => return Ok(()),
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(sound)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start {}", self.program))?;

        // Reap the player in the background; playback may take seconds
        thread::spawn(move || {
            if let Err(e) = child.wait() {
                debug!("Siren player did not exit cleanly: {}", e);
            }
        });
        Ok(())
    }
}

/// Forwards each effect to several sinks
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AlarmSink>>,
}

impl AlarmSink for FanoutSink {
    fn play_alert(&self, level: SirenLevel) -> anyhow::Result<()> {
        let failures: Vec<String> = self
            .sinks
            .iter()
            .filter_map(|sink| sink.play_alert(level).err())
            .map(|e| e.to_string())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(failures.join("; ")))
        }
    }
}

/// Build the sink chain described by the alarm configuration
pub fn build_sink(config: &AlarmConfig) -> Option<Arc<dyn AlarmSink>> {
    let mut sinks: Vec<Arc<dyn AlarmSink>> = Vec::new();

    if config.console {
        sinks.push(Arc::new(ConsoleSink::new(ColorChoice::Auto)));
    }

    if let Some(player) = &config.player {
        match CommandSink::new(player, config) {
            Some(sink) => {
                info!("Siren sounds will be played with '{}'", player);
                sinks.push(Arc::new(sink));
            }
            None => info!("Empty siren player command, audio disabled"),
        }
    }

    match sinks.len() {
        0 => None,
        1 => sinks.pop(),
        _ => Some(Arc::new(FanoutSink { sinks })),
    }
}
