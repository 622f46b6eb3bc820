//! CLI Exit Code Registry
//!
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                      |
//! |------|----------------------------------------------|
//! | 0    | Success                                      |
//! | 1    | General error                                |
//! | 2    | Usage error (bad arguments, unknown column)  |
//! | 3    | File could not be read or written            |
//! | 4    | Commit finished with failed edits (browse)   |
//! | 5    | Browse closed without a result               |

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unknown column names.
pub const EXIT_USAGE: u8 = 2;

/// Input could not be loaded or output could not be written.
pub const EXIT_IO: u8 = 3;

/// At least one edit failed in the last commit of a browse session.
/// The other edits were applied and saved.
pub const EXIT_COMMIT_PARTIAL: u8 = 4;

/// Browse session was cancelled (Esc/q with nothing committed).
pub const EXIT_CANCELLED: u8 = 5;
