use futures::future::BoxFuture;
use sqlx::{Connection, PgConnection};
use tracing::{debug, info, instrument, warn};

use crate::database_ops::config::{DbConfig, TlsPolicy};
use crate::database_ops::error::{CatalogError, CatalogResult};

/// One logical connection lifetime, owned by exactly one invocation.
///
/// No pool: each session is a single `PgConnection`. Dropping a session (including
/// when its future is cancelled) closes the socket; `close` does the same but lets
/// the server see a clean terminate.
pub struct Session {
    conn: PgConnection,
    target: String,
}

impl Session {
    // SECURITY: never include raw DSNs or passwords in tracing spans.
    #[instrument(skip(cfg), fields(db = %cfg.redacted_target(), tls = cfg.tls.label()))]
    pub async fn open(cfg: &DbConfig) -> CatalogResult<Self> {
        let target = cfg.redacted_target();
        if cfg.tls == TlsPolicy::SkipVerify {
            warn!(
                db = %target,
                "TLS certificate verification is DISABLED for this session (explicit opt-in)"
            );
        }

        let opts = cfg.connect_options();
        let conn = match tokio::time::timeout(cfg.connect_timeout, PgConnection::connect_with(&opts)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(source)) => return Err(CatalogError::Connection { target, source }),
            Err(_elapsed) => {
                let source = sqlx::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("handshake did not complete within {:?}", cfg.connect_timeout),
                ));
                return Err(CatalogError::Connection { target, source });
            }
        };
        info!("session opened");
        Ok(Self { conn, target })
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// Gracefully terminate the connection. Failures are logged, not returned:
    /// the server side is released either way once the socket closes.
    pub async fn close(self) {
        let target = self.target;
        match self.conn.close().await {
            Ok(()) => debug!(db = %target, "session closed"),
            Err(e) => warn!(db = %target, error = %e, "session close failed; socket dropped"),
        }
    }
}

/// Open a session, run `op` on it, and close it on every exit path.
///
/// ```ignore
/// let product = with_session(&cfg, |s| Box::pin(catalog::fetch_by_id(s, 529))).await?;
/// ```
pub async fn with_session<T, F>(cfg: &DbConfig, op: F) -> CatalogResult<T>
where
    T: Send,
    F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, CatalogResult<T>>,
{
    let mut session = Session::open(cfg).await?;
    let result = op(&mut session).await;
    session.close().await;
    result
}
