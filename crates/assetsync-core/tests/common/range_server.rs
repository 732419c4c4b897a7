//! Minimal HTTP/1.1 server with HEAD and Range GET support for transport tests.
//!
//! Serves a fixed set of paths. Unknown paths get 404. Query strings are ignored.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

/// Starts a server in a background thread serving `files` (path without the
/// leading slash -> body). Returns the base URL, e.g. "http://127.0.0.1:12345/".
pub fn start(files: HashMap<String, Vec<u8>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let files = Arc::new(files);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let files = Arc::clone(&files);
            thread::spawn(move || handle(stream, &files));
        }
    });
    format!("http://127.0.0.1:{}/", port)
}

pub fn start_single(path: &str, body: Vec<u8>) -> String {
    start(HashMap::from([(path.to_string(), body)]))
}

fn handle(mut stream: std::net::TcpStream, files: &HashMap<String, Vec<u8>>) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, path, range) = parse_request(request);
    let Some(body) = files.get(path) else {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        return;
    };
    let total = body.len() as u64;

    if method.eq_ignore_ascii_case("HEAD") {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\n\r\n",
            total
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
        return;
    }

    let (status, content_range, slice) = match range {
        Some((start, _)) if start >= total => (
            "416 Range Not Satisfiable",
            format!("bytes */{}", total),
            &body[0..0],
        ),
        Some((start, end_incl)) => {
            let end_excl = end_incl.saturating_add(1).min(total) as usize;
            let start = start as usize;
            (
                "206 Partial Content",
                format!("bytes {}-{}/{}", start, end_excl - 1, total),
                &body[start..end_excl],
            )
        }
        None => (
            "200 OK",
            format!("bytes 0-{}/{}", total.saturating_sub(1), total),
            &body[..],
        ),
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Range: {}\r\nAccept-Ranges: bytes\r\n\r\n",
        status,
        slice.len(),
        content_range
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}

/// Returns (method, path without leading slash or query, optional (start, end_inclusive)).
fn parse_request(request: &str) -> (&str, &str, Option<(u64, u64)>) {
    let mut method = "";
    let mut path = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            let mut parts = line.split_whitespace();
            method = parts.next().unwrap_or("");
            let target = parts.next().unwrap_or("/");
            let target = target.split('?').next().unwrap_or(target);
            path = target.trim_start_matches('/');
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if let Some(spec) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = spec.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, path, range)
}
