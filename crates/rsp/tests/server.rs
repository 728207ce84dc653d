//! Loopback sessions between a scripted debugger and the server.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;

use rsp::ServerError;
use rsp::gdb::{GdbServer, ServerConfig, SessionEnd};
use rsp::sim::{MachineConfig, SimError, SimMachine, boot};
use rsp_wire::{encode_frame, hex_encode};

/// Minimal debugger side of the protocol.
struct Client {
    stream: TcpStream,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_nodelay(true).unwrap();
        Self { stream }
    }

    fn byte(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        self.stream.read_exact(&mut byte).unwrap();
        byte[0]
    }

    fn send(&mut self, payload: &str) {
        self.stream.write_all(&encode_frame(payload.as_bytes())).unwrap();
        assert_eq!(self.byte(), b'+', "{payload} not acknowledged");
    }

    /// Next packet payload, acknowledged.
    fn packet(&mut self) -> String {
        while self.byte() != b'$' {}
        let mut payload = Vec::new();
        loop {
            match self.byte() {
                b'#' => break,
                b => payload.push(b),
            }
        }
        self.byte();
        self.byte();
        // The server may already be gone after a final packet.
        let _ = self.stream.write_all(b"+");
        String::from_utf8(payload).unwrap()
    }

    fn request(&mut self, payload: &str) -> String {
        self.send(payload);
        self.packet()
    }
}

fn machine(config: MachineConfig) -> SimMachine {
    SimMachine::new(config).unwrap()
}

/// Serve one session on an ephemeral port while `script` plays the debugger.
fn session<T: Send + 'static>(
    machine: SimMachine,
    script: impl FnOnce(Client) -> T + Send + 'static,
) -> (SessionEnd, T, SimMachine) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = thread::spawn(move || script(Client::connect(addr)));

    let mut server = GdbServer::new(
        machine,
        ServerConfig {
            addr: addr.to_string(),
            quantum: 16,
            once: true,
        },
    );
    let end = server.serve_listener(&listener).unwrap();
    (end, client.join().unwrap(), server.into_machine())
}

#[test]
fn test_stop_reason_then_kill() {
    let (end, reply, _) = session(machine(MachineConfig::default()), |mut c| {
        let reply = c.request("?");
        c.stream.write_all(&encode_frame(b"k")).unwrap();
        reply
    });
    assert_eq!(end, SessionEnd::Killed);
    assert_eq!(reply, "T05thread:1;");
}

#[test]
fn test_breakpoint_and_memory() {
    let mut m = machine(MachineConfig {
        threads: 2,
        memory_base: 0x8000_0000,
        memory_size: 0x1000,
        ..MachineConfig::default()
    });
    m.load_image(&[0x13, 0x00, 0x00, 0x00]).unwrap();

    let (end, replies, _) = session(m, |mut c| {
        let mut replies = vec![
            c.request("qSupported:multiprocess+"),
            c.request("qXfer:features:read:target.xml:0,ffb"),
            c.request("Z0,80000010,4"),
            c.request("m80000000,4"),
        ];
        c.send("c");
        replies.push(c.packet());
        replies.push(c.request("p20"));
        replies.push(c.request("qfThreadInfo"));
        replies.push(c.request("qsThreadInfo"));
        replies.push(c.request("qsThreadInfo"));
        c.stream.write_all(&encode_frame(b"k")).unwrap();
        replies
    });

    assert_eq!(end, SessionEnd::Killed);
    assert_eq!(replies[0], "PacketSize=1000;qXfer:features:read+");
    assert!(replies[1].starts_with('l'));
    assert!(replies[1].contains("riscv:rv64"));
    assert_eq!(replies[2], "OK");
    assert_eq!(replies[3], "13000000");
    assert_eq!(replies[4], "T05thread:01;");
    assert_eq!(replies[5], "1000008000000000");
    assert_eq!(&replies[6..], ["m1", "m2", "l"]);
}

#[test]
fn test_interrupt_running_target() {
    let (end, reply, m) = session(machine(MachineConfig::default()), |mut c| {
        c.send("c");
        c.stream.write_all(&[0x03]).unwrap();
        let reply = c.packet();
        c.stream.write_all(&encode_frame(b"k")).unwrap();
        reply
    });
    assert_eq!(end, SessionEnd::Killed);
    assert_eq!(reply, "T05thread:1;");
    assert!(!m.is_running());
}

#[test]
fn test_target_exit() {
    let config = MachineConfig {
        max_insns: Some(100),
        ..MachineConfig::default()
    };
    let (end, reply, m) = session(machine(config), |mut c| {
        assert_eq!(c.request("P0a=2a00000000000000"), "");
        c.send("c");
        c.packet()
    });
    assert_eq!(end, SessionEnd::TargetExited(0));
    assert_eq!(reply, "W00");
    assert_eq!(m.retired(), 100);
}

#[test]
fn test_monitor_over_the_wire() {
    let (_, replies, _) = session(
        machine(MachineConfig {
            threads: 3,
            ..MachineConfig::default()
        }),
        |mut c| {
            c.send(&format!("qRcmd,{}", hex_encode(b"threads")));
            let output = c.packet();
            let done = c.packet();
            drop(c);
            (output, done)
        },
    );
    let (output, done) = replies;
    assert!(output.starts_with('O'));
    assert_eq!(output.len() % 2, 1);
    assert_eq!(done, "OK");
}

#[test]
fn test_disconnect_ends_single_session() {
    let (end, (), m) = session(machine(MachineConfig::default()), drop);
    assert_eq!(end, SessionEnd::Disconnected);
    assert!(!m.is_running());
}

#[test]
fn test_boot_loads_image_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0xef, 0xbe, 0xad, 0xde]).unwrap();

    let m = boot(MachineConfig::default(), Some(file.path())).unwrap();
    let (_, reply, _) = session(m, |mut c| c.request("m80000000,4"));
    assert_eq!(reply, "efbeadde");
}

#[test]
fn test_boot_image_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.bin");
    assert!(matches!(
        boot(MachineConfig::default(), Some(missing.as_path())),
        Err(ServerError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound
    ));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0; 0x20]).unwrap();
    let small = MachineConfig {
        memory_size: 0x10,
        ..MachineConfig::default()
    };
    assert!(matches!(
        boot(small, Some(file.path())),
        Err(ServerError::Sim(SimError::ImageTooLarge { len: 0x20, size: 0x10 }))
    ));
}
