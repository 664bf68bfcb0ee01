//! Play / pause / single-step / reset.
//!
//! The machine only decides whether a frame runs and how many substeps it
//! gets; the pipeline owns the buffers and performs the reset itself.

use log::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlState {
    Paused,
    Running,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    TogglePause,
    /// Run exactly one substep, then pause again.
    SingleStep,
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Paused,
    /// One of the first frames after start in variable-time-step mode,
    /// whose measured frame time is unreliable.
    WarmingUp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameGate {
    Skip(SkipReason),
    /// Run the frame. `substeps` overrides the configured substep count.
    Run { substeps: Option<u32> },
}

impl FrameGate {
    pub fn runs(&self) -> bool {
        matches!(self, FrameGate::Run { .. })
    }
}

#[derive(Clone, Debug)]
pub struct ControlStateMachine {
    state: ControlState,
    /// Pause again after the next frame that actually runs.
    pause_next_frame: bool,
}

impl ControlStateMachine {
    pub fn new(start_paused: bool) -> Self {
        Self {
            state: if start_paused {
                ControlState::Paused
            } else {
                ControlState::Running
            },
            pause_next_frame: false,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == ControlState::Paused
    }

    pub fn single_step_pending(&self) -> bool {
        self.pause_next_frame
    }

    /// Decide whether frame `frame_index` (1-based) runs. The first
    /// `warmup_frames` frames are skipped, but only when the frame time is
    /// measured, not fixed.
    pub fn begin_frame(
        &self,
        frame_index: u64,
        fixed_time_step: bool,
        warmup_frames: u64,
    ) -> FrameGate {
        if self.state == ControlState::Paused {
            return FrameGate::Skip(SkipReason::Paused);
        }
        if !fixed_time_step && frame_index <= warmup_frames {
            return FrameGate::Skip(SkipReason::WarmingUp);
        }
        FrameGate::Run {
            substeps: self.pause_next_frame.then_some(1),
        }
    }

    /// Apply the deferred pause of a single step once its frame has run.
    pub fn end_frame(&mut self, ran: bool) {
        if ran && self.pause_next_frame {
            self.pause_next_frame = false;
            self.state = ControlState::Paused;
            debug!("single step done, paused");
        }
    }

    /// Returns true when the caller must reset the particle buffers.
    pub fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::TogglePause => {
                self.state = match self.state {
                    ControlState::Paused => ControlState::Running,
                    ControlState::Running => ControlState::Paused,
                };
                self.pause_next_frame = false;
                false
            }
            Command::SingleStep => {
                self.state = ControlState::Running;
                self.pause_next_frame = true;
                false
            }
            Command::Reset => {
                self.reset();
                true
            }
        }
    }

    /// Reset always leaves the simulation paused.
    pub fn reset(&mut self) {
        self.state = ControlState::Paused;
        self.pause_next_frame = false;
    }
}
