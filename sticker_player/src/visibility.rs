/// Whether the sticker should be animating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
}

/// Edge produced by a change of effective visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Play,
    Stop,
}

/// Folds "visible" and "attached to a display" into one playing decision.
///
/// Only changes of `visible && displayed` produce a [`Transition`]; setting
/// an input to the value it already has is a no-op.
#[derive(Debug, Default, Clone)]
pub struct VisibilityGate {
    visible: bool,
    displayed: bool,
    state: PlaybackState,
}

impl VisibilityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_visible(&mut self, visible: bool) -> Option<Transition> {
        self.visible = visible;
        self.update()
    }

    pub fn set_displayed(&mut self, displayed: bool) -> Option<Transition> {
        self.displayed = displayed;
        self.update()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    fn update(&mut self) -> Option<Transition> {
        let effective = self.visible && self.displayed;
        match (self.state, effective) {
            (PlaybackState::Stopped, true) => {
                self.state = PlaybackState::Playing;
                Some(Transition::Play)
            }
            (PlaybackState::Playing, false) => {
                self.state = PlaybackState::Stopped;
                Some(Transition::Stop)
            }
            _ => None,
        }
    }
}
