use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use escpos_driver::{Connection, ModelId, NetworkConnection, Printer, RetryPolicy};

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1), 2).unwrap()
}

/// Accept one client, answer `reply` once `expect` bytes arrived, then
/// collect everything until the client hangs up.
fn spawn_printer(expect: usize, reply: Vec<u8>) -> (u16, mpsc::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut received = vec![0u8; expect];
        socket.read_exact(&mut received).unwrap();
        if !reply.is_empty() {
            socket.write_all(&reply).unwrap();
        }
        socket.read_to_end(&mut received).unwrap();
        tx.send(received).unwrap();
    });

    (port, rx)
}

#[test]
fn test_write_and_read_over_loopback() {
    let (port, rx) = spawn_printer(5, vec![0x12]);

    let mut conn = NetworkConnection::create(&format!("127.0.0.1:{}", port), fast_policy())
        .unwrap()
        .with_select_timeout(Duration::from_secs(2));
    conn.catch().unwrap();
    assert!(conn.is_open());

    conn.write(b"\x1B\x40abc").unwrap();
    assert_eq!(conn.read().unwrap(), vec![0x12]);

    conn.write(b"\n").unwrap();
    conn.release().unwrap();
    assert!(!conn.is_open());

    let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(received, b"\x1B\x40abc\n");
}

#[test]
fn test_printer_session_over_loopback() {
    let expected: &[u8] = b"\x1B\x40\x1B\x61\x01Hello\n\x1D\x56\x01";
    let (port, rx) = spawn_printer(expected.len(), Vec::new());

    let conn = NetworkConnection::create(&format!("127.0.0.1:{}", port), fast_policy()).unwrap();
    let mut printer = Printer::new(conn, ModelId::EpsonTmT20.model()).unwrap();
    printer.init().unwrap();
    printer.text_center("Hello").unwrap();
    printer.cut(true).unwrap();
    printer.release().unwrap();

    let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(received, expected);
}

#[test]
fn test_catch_refused_gives_up() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut conn = NetworkConnection::new("127.0.0.1", port, fast_policy())
        .with_timeout(Duration::from_millis(500));
    assert!(conn.catch().is_err());
    assert!(!conn.is_open());
    assert!(!conn.probe(Duration::from_millis(200)));
}

#[test]
fn test_probe_online() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let conn = NetworkConnection::new("127.0.0.1", port, fast_policy());
    assert!(conn.probe(Duration::from_secs(1)));
    assert!(!conn.is_open());
}
