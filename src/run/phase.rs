//! Phases, per-phase status codes and run outcomes.

use std::fmt;

/// The fixed phase sequence of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Initialize,
    Load,
    Validate,
    Distribute,
    Preprocess,
    Redistribute,
    Remesh,
    Unscale,
    Merge,
    Finalize,
}

impl Phase {
    pub const ALL: [Phase; 10] = [
        Phase::Initialize,
        Phase::Load,
        Phase::Validate,
        Phase::Distribute,
        Phase::Preprocess,
        Phase::Redistribute,
        Phase::Remesh,
        Phase::Unscale,
        Phase::Merge,
        Phase::Finalize,
    ];

    /// 1-based position in the sequence.
    pub fn number(self) -> usize {
        self as usize + 1
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Initialize => "INITIALIZATION",
            Phase::Load => "LOADING MESH",
            Phase::Validate => "CHECKING INPUT",
            Phase::Distribute => "DISTRIBUTION",
            Phase::Preprocess => "ANALYSIS",
            Phase::Redistribute => "LOAD BALANCING",
            Phase::Remesh => "MESH ADAPTATION",
            Phase::Unscale => "UNSCALING",
            Phase::Merge => "MERGING",
            Phase::Finalize => "MESH PACKING UP",
        }
    }

    /// The phase after this one, if any.
    pub fn next(self) -> Option<Phase> {
        Phase::ALL.get(self.number()).copied()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PHASE {} : {}", self.number(), self.name())
    }
}

/// Outcome of one phase on one process; the agreed status of a phase is the
/// maximum over all processes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PhaseStatus {
    Ok = 0,
    /// Failed, but the fragment is still a valid mesh.
    Recoverable = 1,
    /// Failed and left nothing trustworthy behind.
    Fatal = 2,
}

impl PhaseStatus {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a reduced status; unknown codes count as fatal.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => PhaseStatus::Ok,
            1 => PhaseStatus::Recoverable,
            _ => PhaseStatus::Fatal,
        }
    }

    #[inline]
    pub fn is_ok(self) -> bool {
        self == PhaseStatus::Ok
    }
}

/// Final classification of a run, ordered by severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunOutcome {
    /// Every phase completed and the output was written.
    Success,
    /// Something failed, but the mesh was returned to physical coordinates
    /// (or only the solution write failed).
    LowFailure,
    /// No trustworthy mesh exists; nothing was written.
    StrongFailure,
}

impl RunOutcome {
    /// Process exit status: 0, 1 or 2.
    pub fn exit_code(self) -> u8 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::LowFailure => 1,
            RunOutcome::StrongFailure => 2,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunOutcome::Success => "success",
            RunOutcome::LowFailure => "low failure",
            RunOutcome::StrongFailure => "strong failure",
        })
    }
}
