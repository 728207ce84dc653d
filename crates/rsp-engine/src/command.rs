//! Command line → command.
//!
//! Parsing is purely syntactic. Whether a command is allowed (feature
//! negotiation, size limits, provider support) is decided at dispatch.

use rsp_wire::Scanner;

/// One decoded command.
///
/// Hex payloads are borrowed undecoded from the line; numbers are already
/// scanned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// `?`
    StopReason,
    /// `c[addr]`
    Continue { addr: Option<u64> },
    /// `C<sig>[;addr]`; the signal and address are ignored.
    ContinueWithSignal,
    /// `s[addr]`
    Step { addr: Option<u64> },
    /// `D`
    Detach,
    /// `k`
    Kill,
    /// `g`
    ReadRegisters,
    /// `G<hex>`
    WriteRegisters { hex: &'a [u8] },
    /// `p<idx>`
    ReadRegister { index: u64 },
    /// `P<idx>=<hex>`
    WriteRegister { index: u64, hex: &'a [u8] },
    /// `m<addr>,<len>`
    ReadMemory { addr: u64, len: u64 },
    /// `M<addr>,<len>:<hex>`
    WriteMemory { addr: u64, len: u64, hex: &'a [u8] },
    /// `Z<type>,<addr>,<len>`
    InsertBreakpoint { kind: u64, addr: u64, len: u64 },
    /// `z<type>,<addr>,<len>`
    RemoveBreakpoint { kind: u64, addr: u64, len: u64 },
    /// `H<op><thread>`
    SetThread { op: u8, thread: u64 },
    /// `T<thread>`
    ThreadAlive { thread: u64 },
    /// `qC`
    CurrentThread,
    /// `qfThreadInfo`
    FirstThreadInfo,
    /// `qsThreadInfo`
    NextThreadInfo,
    /// `qThreadExtraInfo,<thread>`
    ThreadExtraInfo { thread: u64 },
    /// `qRcmd,<hex>`
    Monitor { hex: &'a [u8] },
    /// `qSupported[:features]`
    Supported,
    /// `qXfer:features:read:<annex>:<offset>,<len>`
    ReadFeatures { annex: &'a [u8], offset: u64, len: u64 },
    /// `qAttached[:pid]`
    Attached,
    /// `qqemu.sstepbits`
    StepBits,
    /// `qqemu.sstep`
    StepFlags,
    /// `qqemu.sstep=<flags>`
    SetStepFlags { flags: u64 },
    /// `vCont?`
    ContinueActions,
    /// Anything else.
    Unknown,
}

/// `p` starts with `query` and ends there or continues with `separator`.
fn is_query(p: &[u8], query: &[u8], separator: u8) -> bool {
    p.strip_prefix(query)
        .is_some_and(|rest| rest.first().is_none_or(|&b| b == separator))
}

fn optional_addr(args: &[u8]) -> Option<u64> {
    (!args.is_empty()).then(|| Scanner::new(args).hex())
}

/// `<type>,<addr>,<len>`
fn breakpoint_fields(args: &[u8]) -> (u64, u64, u64) {
    let mut scan = Scanner::new(args);
    let kind = scan.hex();
    scan.skip(b',');
    let addr = scan.hex();
    scan.skip(b',');
    let len = scan.hex();
    (kind, addr, len)
}

impl<'a> Command<'a> {
    /// Decode a verified command line.
    #[must_use]
    pub fn parse(line: &'a [u8]) -> Self {
        let Some((&letter, args)) = line.split_first() else {
            return Self::Unknown;
        };
        match letter {
            b'?' => Self::StopReason,
            b'c' => Self::Continue {
                addr: optional_addr(args),
            },
            b'C' => Self::ContinueWithSignal,
            b's' => Self::Step {
                addr: optional_addr(args),
            },
            b'D' => Self::Detach,
            b'k' => Self::Kill,
            b'g' => Self::ReadRegisters,
            b'G' => Self::WriteRegisters { hex: args },
            b'p' => Self::ReadRegister {
                index: Scanner::new(args).hex(),
            },
            b'P' => {
                let mut scan = Scanner::new(args);
                let index = scan.hex();
                scan.skip(b'=');
                Self::WriteRegister {
                    index,
                    hex: scan.rest(),
                }
            }
            b'm' => {
                let mut scan = Scanner::new(args);
                let addr = scan.hex();
                scan.skip(b',');
                Self::ReadMemory {
                    addr,
                    len: scan.hex(),
                }
            }
            b'M' => {
                let mut scan = Scanner::new(args);
                let addr = scan.hex();
                scan.skip(b',');
                let len = scan.hex();
                scan.skip(b':');
                Self::WriteMemory {
                    addr,
                    len,
                    hex: scan.rest(),
                }
            }
            b'Z' => {
                let (kind, addr, len) = breakpoint_fields(args);
                Self::InsertBreakpoint { kind, addr, len }
            }
            b'z' => {
                let (kind, addr, len) = breakpoint_fields(args);
                Self::RemoveBreakpoint { kind, addr, len }
            }
            b'H' => match args.split_first() {
                Some((&op, thread)) => Self::SetThread {
                    op,
                    thread: Scanner::new(thread).hex(),
                },
                None => Self::SetThread { op: 0, thread: 0 },
            },
            b'T' => Self::ThreadAlive {
                thread: Scanner::new(args).hex(),
            },
            b'q' | b'Q' => Self::parse_query(args),
            b'v' if args.starts_with(b"Cont?") => Self::ContinueActions,
            _ => Self::Unknown,
        }
    }

    fn parse_query(p: &'a [u8]) -> Self {
        if p == b"qemu.sstepbits" {
            return Self::StepBits;
        }
        if is_query(p, b"qemu.sstep", b'=') {
            return match p.strip_prefix(b"qemu.sstep=") {
                Some(flags) => Self::SetStepFlags {
                    flags: Scanner::new(flags).hex(),
                },
                None => Self::StepFlags,
            };
        }
        match p {
            b"C" => return Self::CurrentThread,
            b"fThreadInfo" => return Self::FirstThreadInfo,
            b"sThreadInfo" => return Self::NextThreadInfo,
            _ => {}
        }
        if let Some(thread) = p.strip_prefix(b"ThreadExtraInfo,") {
            return Self::ThreadExtraInfo {
                thread: Scanner::new(thread).hex(),
            };
        }
        if let Some(hex) = p.strip_prefix(b"Rcmd,") {
            return Self::Monitor { hex };
        }
        if is_query(p, b"Supported", b':') {
            return Self::Supported;
        }
        if let Some(args) = p.strip_prefix(b"Xfer:features:read:") {
            let mut scan = Scanner::new(args);
            let annex = scan.until(b':');
            scan.skip(b':');
            let offset = scan.hex();
            scan.skip(b',');
            let len = scan.hex();
            return Self::ReadFeatures { annex, offset, len };
        }
        if is_query(p, b"Attached", b':') {
            return Self::Attached;
        }
        Self::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_control() {
        assert_eq!(Command::parse(b"?"), Command::StopReason);
        assert_eq!(Command::parse(b"c"), Command::Continue { addr: None });
        assert_eq!(
            Command::parse(b"c8000"),
            Command::Continue { addr: Some(0x8000) }
        );
        assert_eq!(Command::parse(b"C05"), Command::ContinueWithSignal);
        assert_eq!(Command::parse(b"s"), Command::Step { addr: None });
        assert_eq!(Command::parse(b"s10"), Command::Step { addr: Some(0x10) });
        assert_eq!(Command::parse(b"D"), Command::Detach);
        assert_eq!(Command::parse(b"k"), Command::Kill);
    }

    #[test]
    fn test_registers() {
        assert_eq!(Command::parse(b"g"), Command::ReadRegisters);
        assert_eq!(
            Command::parse(b"G0102"),
            Command::WriteRegisters { hex: b"0102" }
        );
        assert_eq!(Command::parse(b"p20"), Command::ReadRegister { index: 0x20 });
        assert_eq!(
            Command::parse(b"P1f=deadbeef"),
            Command::WriteRegister {
                index: 0x1f,
                hex: b"deadbeef"
            }
        );
    }

    #[test]
    fn test_memory() {
        assert_eq!(
            Command::parse(b"m1000,4"),
            Command::ReadMemory {
                addr: 0x1000,
                len: 4
            }
        );
        assert_eq!(
            Command::parse(b"M1000,2:abcd"),
            Command::WriteMemory {
                addr: 0x1000,
                len: 2,
                hex: b"abcd"
            }
        );
    }

    #[test]
    fn test_breakpoints() {
        assert_eq!(
            Command::parse(b"Z0,400,4"),
            Command::InsertBreakpoint {
                kind: 0,
                addr: 0x400,
                len: 4
            }
        );
        assert_eq!(
            Command::parse(b"z2,ff00,8"),
            Command::RemoveBreakpoint {
                kind: 2,
                addr: 0xff00,
                len: 8
            }
        );
    }

    #[test]
    fn test_threads() {
        assert_eq!(
            Command::parse(b"Hc-1"),
            Command::SetThread {
                op: b'c',
                thread: u64::MAX
            }
        );
        assert_eq!(
            Command::parse(b"Hg0"),
            Command::SetThread { op: b'g', thread: 0 }
        );
        assert_eq!(Command::parse(b"T1a"), Command::ThreadAlive { thread: 0x1a });
        assert_eq!(Command::parse(b"qC"), Command::CurrentThread);
        assert_eq!(Command::parse(b"qfThreadInfo"), Command::FirstThreadInfo);
        assert_eq!(Command::parse(b"qsThreadInfo"), Command::NextThreadInfo);
        assert_eq!(
            Command::parse(b"qThreadExtraInfo,2"),
            Command::ThreadExtraInfo { thread: 2 }
        );
    }

    #[test]
    fn test_queries() {
        assert_eq!(
            Command::parse(b"qSupported:multiprocess+;xmlRegisters=i386"),
            Command::Supported
        );
        assert_eq!(Command::parse(b"qSupported"), Command::Supported);
        assert_eq!(Command::parse(b"qSupportedX"), Command::Unknown);
        assert_eq!(Command::parse(b"qAttached"), Command::Attached);
        assert_eq!(Command::parse(b"qAttached:1"), Command::Attached);
        assert_eq!(
            Command::parse(b"qRcmd,68656c70"),
            Command::Monitor { hex: b"68656c70" }
        );
        assert_eq!(
            Command::parse(b"qXfer:features:read:target.xml:0,ffb"),
            Command::ReadFeatures {
                annex: b"target.xml",
                offset: 0,
                len: 0xffb
            }
        );
        // 'Q' shares the query table
        assert_eq!(Command::parse(b"QC"), Command::CurrentThread);
        assert_eq!(Command::parse(b"qTStatus"), Command::Unknown);
    }

    #[test]
    fn test_step_flags() {
        assert_eq!(Command::parse(b"qqemu.sstepbits"), Command::StepBits);
        assert_eq!(Command::parse(b"qqemu.sstep"), Command::StepFlags);
        assert_eq!(
            Command::parse(b"qqemu.sstep=0x5"),
            Command::SetStepFlags { flags: 5 }
        );
        assert_eq!(Command::parse(b"qqemu.sstepx"), Command::Unknown);
    }

    #[test]
    fn test_continue_actions_and_unknown() {
        assert_eq!(Command::parse(b"vCont?"), Command::ContinueActions);
        assert_eq!(Command::parse(b"vCont;c"), Command::Unknown);
        assert_eq!(Command::parse(b"vMustReplyEmpty"), Command::Unknown);
        assert_eq!(Command::parse(b"X1000,0:"), Command::Unknown);
        assert_eq!(Command::parse(b""), Command::Unknown);
    }
}
