//! Smoothed progress for a session.
//!
//! Two independent signals feed the bar: exact byte counts from the upload and
//! an opaque "still indexing" state from the remote service. Each signal moves
//! a `target`; animation ticks move the `displayed` value toward it. Displayed
//! values never decrease and only reach 100 once the phase has completed.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSettings {
    /// Largest move of a displayed value per tick.
    pub tick_step: u8,
    /// Target increase per synthesized indexing step.
    pub indexing_step: u8,
    /// Highest indexing target before readiness is confirmed.
    pub indexing_ceiling: u8,
    /// Highest upload target before the store confirms the object.
    pub upload_ceiling: u8,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            tick_step: 5,
            indexing_step: 5,
            indexing_ceiling: 90,
            upload_ceiling: 99,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressReading {
    pub upload: u8,
    pub index: u8,
}

impl ProgressReading {
    /// Single bar value spanning both phases.
    pub fn overall(self) -> u8 {
        let sum = u16::from(self.upload) + u16::from(self.index);
        u8::try_from(sum / 2).unwrap_or(100)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Track {
    displayed: u8,
    target: u8,
}

impl Track {
    fn raise_target(&mut self, target: u8) {
        self.target = self.target.max(target.min(100));
    }

    fn advance(&mut self, step: u8) {
        if self.displayed < self.target {
            self.displayed = self.displayed.saturating_add(step).min(self.target);
        }
    }

    fn settle(&mut self) {
        self.target = 100;
        self.displayed = 100;
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressSynthesizer {
    settings: ProgressSettings,
    upload: Track,
    index: Track,
    indexing: bool,
}

impl ProgressSynthesizer {
    pub fn new(settings: ProgressSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Record raw byte progress. Out-of-order or repeated reports never move
    /// the target backwards.
    pub fn observe_upload(&mut self, sent: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = u8::try_from(sent.min(total).saturating_mul(100) / total).unwrap_or(100);
        self.upload
            .raise_target(percent.min(self.settings.upload_ceiling));
    }

    pub fn complete_upload(&mut self) {
        self.upload.settle();
    }

    /// Start synthesizing indexing progress on every tick.
    pub fn begin_indexing(&mut self) {
        self.indexing = true;
    }

    pub fn observe_indexing_step(&mut self) {
        let next = self
            .index
            .target
            .saturating_add(self.settings.indexing_step)
            .min(self.settings.indexing_ceiling);
        self.index.raise_target(next);
    }

    pub fn complete_indexing(&mut self) {
        self.indexing = false;
        self.index.settle();
    }

    /// One animation frame.
    pub fn tick(&mut self) {
        if self.indexing {
            self.observe_indexing_step();
        }
        self.upload.advance(self.settings.tick_step);
        self.index.advance(self.settings.tick_step);
    }

    pub fn reading(&self) -> ProgressReading {
        ProgressReading {
            upload: self.upload.displayed,
            index: self.index.displayed,
        }
    }
}
