//! A thin TCP front end for `tpcore`'s session driver.
//!
//! The accept loop itself is explicitly out of scope for the core (§1:
//! "the TCP listener and session accept loop" is an external
//! collaborator); this binary is the minimal shim the teacher's own
//! crate lacks (an FFI binding library has no server loop of its own)
//! so the transaction monitor is actually runnable. One thread per
//! connection mirrors the original's one-pthread-per-session model.
//!
//! Request framing: the first line a client sends is
//! `<program> <terminal-id> <standalone|indb> <commarea|nocommarea>`;
//! everything after that is the verb dialogue §6 describes. This
//! four-field preamble is server-internal framing, not part of the
//! documented client-channel vocabulary (§1 non-goals: "does not
//! standardise the exact wire text of every command").

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use tpcore::config::MonitorConfig;
use tpcore::monitor::Monitor;
use tpcore::protocol::ClientChannel;
use tpcore::session::{DispatchMode, SessionDriver};

#[cfg(feature = "postgres-backend")]
use tpcore::pool::PostgresPool;

fn main() {
    tracing_subscriber::fmt::init();

    let config = MonitorConfig::from_env();
    let bind_addr = std::env::var("TPCORE_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:4040".to_string());

    #[cfg(feature = "postgres-backend")]
    let pool = PostgresPool::connect(&config.db_connect_string, config.pool_size)
        .map(|p| Arc::new(p) as Arc<dyn tpcore::pool::ConnectionPool>)
        .ok();
    #[cfg(not(feature = "postgres-backend"))]
    let pool: Option<Arc<dyn tpcore::pool::ConnectionPool>> = None;

    let monitor = Arc::new(Monitor::new(config, pool).expect("monitor initialization failed"));

    let listener = TcpListener::bind(&bind_addr).expect("failed to bind listen socket");
    tracing::info!(addr = %bind_addr, "tpcore-server listening");

    for incoming in listener.incoming() {
        let stream = match incoming {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to accept connection");
                continue;
            }
        };
        let monitor = Arc::clone(&monitor);
        std::thread::spawn(move || handle_connection(monitor, stream));
    }
}

fn handle_connection(monitor: Arc<Monitor>, stream: TcpStream) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
    let mut channel = ClientChannel::new(stream);

    let preamble = match channel.read_line() {
        Ok(line) => line,
        Err(_) => return,
    };
    let fields: Vec<&str> = preamble.trim().split_whitespace().collect();
    let (program, terminal_id, mode, set_comm_area) = match fields.as_slice() {
        [program, terminal_id, mode, comm] => (
            *program,
            *terminal_id,
            if mode.eq_ignore_ascii_case("indb") { DispatchMode::InDbTransaction } else { DispatchMode::Standalone },
            comm.eq_ignore_ascii_case("commarea"),
        ),
        _ => {
            tracing::warn!(peer = %peer, "malformed session preamble");
            return;
        }
    };

    let driver = SessionDriver::new(&monitor);
    if let Err(e) = driver.dispatch(&mut channel, program, terminal_id, set_comm_area, mode) {
        tracing::warn!(peer = %peer, program, error = %e, "session ended with error");
    }
}
