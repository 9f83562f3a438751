pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INPUT_ERROR: i32 = 2;
/// Some batch files failed, others succeeded
pub const PARTIAL_FAILURE: i32 = 3;
/// 128 + SIGINT
pub const CANCELLED: i32 = 130;
