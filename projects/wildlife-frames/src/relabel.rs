// Manual relabel session
//
// Steps through the frames of one video and lets an operator reassign the
// class of each frame. The session only ever rewrites `target` of rows that
// already exist in the ledger, and only of frames the operator toggled;
// nothing is created or deleted.

use crate::error::CurateError;
use crate::ledger::FrameLedger;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct RelabelSession {
    video_name: String,
    frame_inds: Vec<u64>,
    targets: Vec<String>,
    position: usize,
    classes: Vec<String>,
    class_ind: usize,
    /// Positions toggled since the last commit.
    toggled: BTreeSet<usize>,
}

/// What a view needs to render the current frame.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FrameView {
    pub video_name: String,
    pub frame_ind: u64,
    pub file_name: String,
    pub target: String,
    pub position: usize,
    pub frame_count: usize,
    pub classes: Vec<String>,
}

impl RelabelSession {
    pub fn from_ledger(
        ledger: &FrameLedger,
        video_name: &str,
        classes: Vec<String>,
    ) -> Result<Self, CurateError> {
        if classes.is_empty() {
            return Err(CurateError::InvalidConfig(
                "relabeling needs at least one class".to_string(),
            ));
        }

        let mut frames: Vec<(u64, String)> = ledger
            .video_frames(video_name)
            .map(|r| (r.frame_ind(), r.target().to_string()))
            .collect();
        if frames.is_empty() {
            return Err(CurateError::NoFramesForVideo(video_name.to_string()));
        }
        frames.sort_by_key(|(ind, _)| *ind);
        let (frame_inds, targets): (Vec<u64>, Vec<String>) = frames.into_iter().unzip();

        tracing::info!(
            "Relabeling {} with classes {:?}",
            video_name,
            classes
        );

        Ok(Self {
            video_name: video_name.to_string(),
            frame_inds,
            targets,
            position: 0,
            classes,
            class_ind: 0,
            toggled: BTreeSet::new(),
        })
    }

    pub fn video_name(&self) -> &str {
        &self.video_name
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn frame_count(&self) -> usize {
        self.frame_inds.len()
    }

    pub fn current_frame_ind(&self) -> u64 {
        self.frame_inds[self.position]
    }

    pub fn current_target(&self) -> &str {
        &self.targets[self.position]
    }

    pub fn next(&mut self) {
        self.position = (self.position + 1) % self.frame_inds.len();
    }

    pub fn prev(&mut self) {
        self.position = match self.position {
            0 => self.frame_inds.len() - 1,
            p => p - 1,
        };
    }

    /// Advances the class pointer and assigns the new class to the current
    /// frame. The pointer is shared by all frames of the session.
    pub fn toggle_class(&mut self) {
        self.class_ind = (self.class_ind + 1) % self.classes.len();
        let new_class = self.classes[self.class_ind].clone();
        tracing::debug!(
            "Toggling frame {} of {} from {} to {}",
            self.current_frame_ind(),
            self.video_name,
            self.current_target(),
            new_class
        );
        self.targets[self.position] = new_class;
        self.toggled.insert(self.position);
    }

    /// Writes the targets of toggled frames into `ledger`. Rows the operator
    /// did not touch keep whatever the ledger holds. Returns the number of
    /// rows whose target changed.
    pub fn save(&self, ledger: &mut FrameLedger) -> Result<usize, CurateError> {
        let mut changed = 0;
        for &pos in &self.toggled {
            let frame_ind = self.frame_inds[pos];
            let target = &self.targets[pos];
            let unchanged = ledger
                .get(&self.video_name, frame_ind)
                .map(|r| r.target() == target)
                .unwrap_or(true);
            if !unchanged && ledger.set_target(&self.video_name, frame_ind, target)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Reads the ledger at `ledger_path`, applies the toggled frames and
    /// writes it back.
    pub fn commit(&mut self, ledger_path: &Path) -> Result<usize> {
        let mut ledger = FrameLedger::read(ledger_path)?;
        let changed = self.save(&mut ledger)?;
        ledger.write(ledger_path)?;
        self.toggled.clear();
        tracing::info!(
            "Saved {} changed targets for {} to {:?}",
            changed,
            self.video_name,
            ledger_path
        );
        Ok(changed)
    }

    pub fn view(&self) -> FrameView {
        let frame_ind = self.current_frame_ind();
        FrameView {
            video_name: self.video_name.clone(),
            frame_ind,
            file_name: crate::ledger::frame_file_name(&self.video_name, frame_ind),
            target: self.current_target().to_string(),
            position: self.position,
            frame_count: self.frame_count(),
            classes: self.classes.clone(),
        }
    }
}

/// Operator input, independent of the view that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelabelEvent {
    Next,
    Prev,
    Toggle,
    Save,
}

impl FromStr for RelabelEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" | "right" => Ok(RelabelEvent::Next),
            "prev" | "left" => Ok(RelabelEvent::Prev),
            "toggle" | "t" => Ok(RelabelEvent::Toggle),
            "save" | "s" => Ok(RelabelEvent::Save),
            other => Err(format!("unknown relabel event '{}'", other)),
        }
    }
}

/// Applies a navigation or toggle event. `Save` needs a ledger and is
/// handled by the caller; it returns true so the caller knows to commit.
pub fn apply_event(session: &mut RelabelSession, event: RelabelEvent) -> bool {
    match event {
        RelabelEvent::Next => session.next(),
        RelabelEvent::Prev => session.prev(),
        RelabelEvent::Toggle => session.toggle_class(),
        RelabelEvent::Save => return true,
    }
    false
}
