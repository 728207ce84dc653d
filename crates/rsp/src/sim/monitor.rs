//! Monitor (`qRcmd`) command set.

/// ABI names of the integer registers, indexed by register number.
pub const ABI_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

pub const HELP: &str = "\
help     show this text
threads  list threads and their pcs
regs     dump the registers of the current thread
reset    reload the image and reset every thread
";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorCommand {
    Help,
    Threads,
    Regs,
    Reset,
    Unknown(String),
}

impl MonitorCommand {
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        match text.trim() {
            "" | "help" => Self::Help,
            "threads" => Self::Threads,
            "regs" => Self::Regs,
            "reset" => Self::Reset,
            other => Self::Unknown(other.to_owned()),
        }
    }
}
