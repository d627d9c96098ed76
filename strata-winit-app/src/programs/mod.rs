//! 演示用的 program：不创建 pipeline，只记录被调度的情况

pub mod compute_demo;
pub mod draw_demo;

/// 每隔多少帧输出一次 debug 日志
const LOG_INTERVAL: u64 = 300;
