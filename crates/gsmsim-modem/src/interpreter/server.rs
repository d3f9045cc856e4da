use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use gsmsim_config::SharedConfig;

use super::ModelInterpreter;

/// Accept polling interval while no session is connected
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Serves the AT interpreter over TCP, one session at a time. Every session
/// drives the same call state, so a reconnecting client sees its calls again.
pub struct TcpModemServer {
    listener: TcpListener,
    interpreter: Arc<ModelInterpreter>,
    config: SharedConfig,
    running: Arc<AtomicBool>,
    /// Clone of the connected stream, kept so `stop` can unblock the session
    session: Arc<Mutex<Option<TcpStream>>>,
}

/// Clears the running flag and shuts down the connected stream, if any
fn close_session(running: &AtomicBool, session: &Mutex<Option<TcpStream>>) {
    running.store(false, Ordering::SeqCst);
    if let Some(stream) = session.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            tracing::debug!("closing session: {}", e);
        }
    }
}

impl TcpModemServer {
    /// Binds to the configured server address
    pub fn bind(config: SharedConfig, interpreter: Arc<ModelInterpreter>) -> io::Result<Self> {
        let addr = config.config().server.bind_addr();
        Self::bind_addr(&addr, config, interpreter)
    }

    pub fn bind_addr(addr: &str, config: SharedConfig, interpreter: Arc<ModelInterpreter>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        tracing::info!("AT interpreter listening on {}", listener.local_addr()?);

        let running = Arc::new(AtomicBool::new(true));
        let session = Arc::new(Mutex::new(None));
        {
            let running = Arc::clone(&running);
            let session = Arc::clone(&session);
            interpreter.add_shutdown_hook(move || close_session(&running, &session));
        }

        Ok(Self {
            listener,
            interpreter,
            config,
            running,
            session,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn interpreter(&self) -> &Arc<ModelInterpreter> {
        &self.interpreter
    }

    /// Accepts and serves sessions until `stop` is called or the
    /// interpreter shuts down
    pub fn run(&self) -> io::Result<()> {
        while self.running.load(Ordering::SeqCst) && !self.interpreter.is_shut_down() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = self.serve_session(stream, peer) {
                        tracing::warn!("session with {} ended with error: {}", peer, e);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        tracing::info!("AT interpreter server stopped");
        Ok(())
    }

    fn serve_session(&self, stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        tracing::info!("session from {}", peer);
        {
            let mut state = self.config.state_write();
            state.active_session = Some(peer.to_string());
            state.sessions_served += 1;
        }
        *self.lock_session() = Some(stream.try_clone()?);

        // stop() may have raced with the accept
        let result = if self.running.load(Ordering::SeqCst) {
            let input = stream.try_clone()?;
            self.interpreter.serve(input, stream)
        } else {
            Ok(())
        };

        *self.lock_session() = None;
        self.config.state_write().active_session = None;
        tracing::info!("session from {} closed", peer);
        result
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<TcpStream>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stops accepting and closes the connected session
    pub fn stop(&self) {
        close_session(&self.running, &self.session);
    }
}
