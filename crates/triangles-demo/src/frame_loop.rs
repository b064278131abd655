use triangles_engine::input::{InputFrame, InputState, Key};

/// Frame loop state. `Closing` is terminal.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoopState {
    Running,
    Closing,
}

/// Tracks whether the loop should keep running.
///
/// The window-close flag is set either by the exit key or by an external
/// close request; nothing clears it.
#[derive(Debug)]
pub struct FrameLoop {
    state: LoopState,
    exit_key: Key,
}

impl FrameLoop {
    pub fn new(exit_key: Key) -> Self {
        Self {
            state: LoopState::Running,
            exit_key,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_closing(&self) -> bool {
        self.state == LoopState::Closing
    }

    /// Checks the exit key. Returns true only on the frame that starts closing.
    ///
    /// A press released again before the frame ran still counts.
    pub fn poll_input(&mut self, input: &InputState, frame: &InputFrame) -> bool {
        if input.key_down(self.exit_key) || frame.key_pressed(self.exit_key) {
            return self.request_close();
        }
        false
    }

    /// Sets the close flag. Returns true if the loop was still running.
    pub fn request_close(&mut self) -> bool {
        let was_running = self.state == LoopState::Running;
        self.state = LoopState::Closing;
        was_running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triangles_engine::input::{InputEvent, KeyState, Modifiers};

    fn key_event(state: &mut InputState, frame: &mut InputFrame, key: Key, key_state: KeyState) {
        state.apply_event(
            frame,
            InputEvent::Key {
                key,
                state: key_state,
                modifiers: Modifiers::default(),
                repeat: false,
            },
        );
    }

    fn press(state: &mut InputState, key: Key) {
        key_event(state, &mut InputFrame::default(), key, KeyState::Pressed);
    }

    fn idle() -> InputFrame {
        InputFrame::default()
    }

    #[test]
    fn starts_running() {
        let fl = FrameLoop::new(Key::Space);
        assert_eq!(fl.state(), LoopState::Running);
    }

    #[test]
    fn exit_key_closes_within_one_frame() {
        let mut fl = FrameLoop::new(Key::Space);
        let mut input = InputState::default();

        assert!(!fl.poll_input(&input, &idle()));
        press(&mut input, Key::Space);
        assert!(fl.poll_input(&input, &idle()));
        assert!(fl.is_closing());
    }

    #[test]
    fn tap_between_frames_closes() {
        let mut fl = FrameLoop::new(Key::Space);
        let mut input = InputState::default();
        let mut frame = InputFrame::default();

        key_event(&mut input, &mut frame, Key::Space, KeyState::Pressed);
        key_event(&mut input, &mut frame, Key::Space, KeyState::Released);
        assert!(!input.key_down(Key::Space));

        assert!(fl.poll_input(&input, &frame));
        assert!(fl.is_closing());
    }

    #[test]
    fn other_keys_do_not_close() {
        let mut fl = FrameLoop::new(Key::Space);
        let mut input = InputState::default();

        press(&mut input, Key::Escape);
        press(&mut input, Key::Letter('Q'));
        assert!(!fl.poll_input(&input, &idle()));
        assert_eq!(fl.state(), LoopState::Running);
    }

    #[test]
    fn external_close_request_closes() {
        let mut fl = FrameLoop::new(Key::Space);
        assert!(fl.request_close());
        assert!(fl.is_closing());
    }

    #[test]
    fn closing_is_terminal() {
        let mut fl = FrameLoop::new(Key::Space);
        let mut input = InputState::default();
        press(&mut input, Key::Space);

        assert!(fl.poll_input(&input, &idle()));
        // Held key on later frames does not re-trigger, and nothing reopens.
        assert!(!fl.poll_input(&input, &idle()));
        assert!(!fl.request_close());
        assert_eq!(fl.state(), LoopState::Closing);
    }
}
