//! Stage ordering and per-item state.
//!
//! The pipeline is a strict total order of four stages. Everything that walks
//! stages (probe, coordinator, layout) goes through `StageKind::ALL` so the
//! order lives in exactly one place.
use serde::Serialize;
use std::fmt;

/// One ordered step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    TextGenerated,
    SpeechSynthesized,
    AmbienceMixed,
    VideoRendered,
}

impl StageKind {
    /// All stages in pipeline order.
    pub const ALL: [StageKind; 4] = [
        StageKind::TextGenerated,
        StageKind::SpeechSynthesized,
        StageKind::AmbienceMixed,
        StageKind::VideoRendered,
    ];

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<StageKind> {
        match self {
            StageKind::TextGenerated => Some(StageKind::SpeechSynthesized),
            StageKind::SpeechSynthesized => Some(StageKind::AmbienceMixed),
            StageKind::AmbienceMixed => Some(StageKind::VideoRendered),
            StageKind::VideoRendered => None,
        }
    }

    /// The stage whose artifact this stage consumes, if any.
    pub fn previous(self) -> Option<StageKind> {
        match self {
            StageKind::TextGenerated => None,
            StageKind::SpeechSynthesized => Some(StageKind::TextGenerated),
            StageKind::AmbienceMixed => Some(StageKind::SpeechSynthesized),
            StageKind::VideoRendered => Some(StageKind::AmbienceMixed),
        }
    }

    /// Short human label used in banners and logs.
    pub fn label(self) -> &'static str {
        match self {
            StageKind::TextGenerated => "text",
            StageKind::SpeechSynthesized => "speech",
            StageKind::AmbienceMixed => "mix",
            StageKind::VideoRendered => "video",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Observed status of one stage for one item.
///
/// Only `Missing` and `Complete` are ever derived from disk; the other two
/// exist while the coordinator is working on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Missing,
    InProgress,
    Complete,
    Failed,
}

impl StageStatus {
    pub fn is_complete(self) -> bool {
        matches!(self, StageStatus::Complete)
    }
}

/// Coordinator state for a single work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    NeedsText,
    NeedsSpeech,
    NeedsMix,
    NeedsVideo,
    Done,
    Abandoned,
}

impl ItemState {
    /// The state that runs the given stage next.
    pub fn for_stage(stage: StageKind) -> ItemState {
        match stage {
            StageKind::TextGenerated => ItemState::NeedsText,
            StageKind::SpeechSynthesized => ItemState::NeedsSpeech,
            StageKind::AmbienceMixed => ItemState::NeedsMix,
            StageKind::VideoRendered => ItemState::NeedsVideo,
        }
    }

    /// The stage this state is waiting on; `None` for terminal states.
    pub fn stage(self) -> Option<StageKind> {
        match self {
            ItemState::NeedsText => Some(StageKind::TextGenerated),
            ItemState::NeedsSpeech => Some(StageKind::SpeechSynthesized),
            ItemState::NeedsMix => Some(StageKind::AmbienceMixed),
            ItemState::NeedsVideo => Some(StageKind::VideoRendered),
            ItemState::Done | ItemState::Abandoned => None,
        }
    }

    /// Advance one state after the current stage was confirmed.
    pub fn advance(self) -> ItemState {
        match self.stage().and_then(StageKind::next) {
            Some(next) => ItemState::for_stage(next),
            None if self == ItemState::Abandoned => ItemState::Abandoned,
            None => ItemState::Done,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Done | ItemState::Abandoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_follow_total_order() {
        let mut sorted = StageKind::ALL;
        sorted.sort();
        assert_eq!(sorted, StageKind::ALL);
        for pair in StageKind::ALL.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
            assert_eq!(pair[1].previous(), Some(pair[0]));
        }
        assert_eq!(StageKind::VideoRendered.next(), None);
        assert_eq!(StageKind::TextGenerated.previous(), None);
    }

    #[test]
    fn item_state_advances_to_done_without_skipping() {
        let mut state = ItemState::NeedsText;
        let mut visited = vec![state];
        while !state.is_terminal() {
            state = state.advance();
            visited.push(state);
        }
        assert_eq!(
            visited,
            vec![
                ItemState::NeedsText,
                ItemState::NeedsSpeech,
                ItemState::NeedsMix,
                ItemState::NeedsVideo,
                ItemState::Done,
            ]
        );
    }

    #[test]
    fn terminal_states_do_not_advance_into_work() {
        assert_eq!(ItemState::Abandoned.advance(), ItemState::Abandoned);
        assert_eq!(ItemState::Done.advance(), ItemState::Done);
    }
}
