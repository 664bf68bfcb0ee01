use sph_core::control::{Command, ControlState, ControlStateMachine, FrameGate, SkipReason};

/// Run `frames` through the machine the way the pipeline does and return
/// the substep override of every frame that ran.
fn run_frames(
    control: &mut ControlStateMachine,
    frames: std::ops::RangeInclusive<u64>,
    fixed: bool,
    warmup: u64,
) -> Vec<(u64, Option<u32>)> {
    let mut ran = Vec::new();
    for frame in frames {
        let gate = control.begin_frame(frame, fixed, warmup);
        if let FrameGate::Run { substeps } = gate {
            ran.push((frame, substeps));
        }
        control.end_frame(gate.runs());
    }
    ran
}

#[test]
fn test_start_state_follows_settings() {
    assert_eq!(ControlStateMachine::new(true).state(), ControlState::Paused);
    assert_eq!(ControlStateMachine::new(false).state(), ControlState::Running);
}

#[test]
fn test_paused_frames_never_run() {
    let mut control = ControlStateMachine::new(true);
    for frame in 1..=20 {
        assert_eq!(control.begin_frame(frame, true, 0), FrameGate::Skip(SkipReason::Paused));
        control.end_frame(false);
    }
    assert!(control.is_paused());
}

#[test]
fn test_toggle_runs_with_configured_substeps() {
    let mut control = ControlStateMachine::new(true);
    assert!(!control.apply(Command::TogglePause));
    assert_eq!(control.state(), ControlState::Running);
    assert_eq!(
        run_frames(&mut control, 1..=3, true, 0),
        vec![(1, None), (2, None), (3, None)]
    );
    control.apply(Command::TogglePause);
    assert!(run_frames(&mut control, 4..=6, true, 0).is_empty());
}

#[test]
fn test_single_step_runs_one_frame_of_one_substep() {
    let mut control = ControlStateMachine::new(true);
    control.apply(Command::SingleStep);
    assert_eq!(control.state(), ControlState::Running);
    assert!(control.single_step_pending());

    assert_eq!(run_frames(&mut control, 1..=5, true, 0), vec![(1, Some(1))]);
    assert!(control.is_paused());
    assert!(!control.single_step_pending());
}

#[test]
fn test_single_step_from_running_pauses_after_it() {
    let mut control = ControlStateMachine::new(false);
    control.apply(Command::SingleStep);
    assert_eq!(run_frames(&mut control, 1..=3, true, 0), vec![(1, Some(1))]);
    assert!(control.is_paused());
}

#[test]
fn test_single_step_survives_warmup() {
    let mut control = ControlStateMachine::new(true);
    control.apply(Command::SingleStep);
    // Frames 1..=3 are warm-up in variable-time-step mode; the step waits.
    assert_eq!(run_frames(&mut control, 1..=6, false, 3), vec![(4, Some(1))]);
    assert!(control.is_paused());
}

#[test]
fn test_warmup_skips_first_frames() {
    let mut control = ControlStateMachine::new(false);
    assert_eq!(control.begin_frame(1, false, 2), FrameGate::Skip(SkipReason::WarmingUp));
    assert_eq!(control.begin_frame(2, false, 2), FrameGate::Skip(SkipReason::WarmingUp));
    assert_eq!(run_frames(&mut control, 3..=4, false, 2), vec![(3, None), (4, None)]);
}

#[test]
fn test_pause_outranks_warmup() {
    let control = ControlStateMachine::new(true);
    assert_eq!(control.begin_frame(1, false, 5), FrameGate::Skip(SkipReason::Paused));
}

#[test]
fn test_reset_requests_buffers_and_pauses() {
    let mut control = ControlStateMachine::new(false);
    control.apply(Command::SingleStep);
    assert!(control.apply(Command::Reset));
    assert!(control.is_paused());
    assert!(!control.single_step_pending());
    assert!(run_frames(&mut control, 1..=3, true, 0).is_empty());
}

#[test]
fn test_warmup_is_read_per_frame() {
    let control = ControlStateMachine::new(false);
    assert!(control.begin_frame(4, false, 0).runs());
    assert_eq!(control.begin_frame(4, false, 4), FrameGate::Skip(SkipReason::WarmingUp));
    assert!(control.begin_frame(5, false, 4).runs());
}
