//! ABCI socket server adapter
//!
//! Exposes a [`RoundApp`] to the consensus engine through `tendermint-abci`.
//! Connections are served on separate threads; the dispatcher sits behind one
//! mutex so all calls run one at a time in arrival order.

use crate::{
    abci::RoundApp, period::RoundState, transaction::TransactionCodec, Error, Result,
};
use parking_lot::Mutex;
use std::fmt::Display;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use tendermint_abci::{Application, ServerBuilder};
use tendermint_proto::v0_37::abci::{
    RequestBeginBlock, RequestCheckTx, RequestDeliverTx, RequestEndBlock, RequestInfo,
    ResponseBeginBlock, ResponseCheckTx, ResponseCommit, ResponseDeliverTx, ResponseEndBlock,
    ResponseInfo,
};
use tracing::{error, info};

/// Shared dispatcher handle
pub type SharedRoundApp<R, C> = Arc<Mutex<RoundApp<R, C>>>;

/// `tendermint_abci::Application` over a shared [`RoundApp`]
#[derive(Debug)]
pub struct AbciServer<R, C> {
    app: SharedRoundApp<R, C>,
}

impl<R, C> Clone for AbciServer<R, C> {
    fn clone(&self) -> Self {
        Self {
            app: Arc::clone(&self.app),
        }
    }
}

impl<R, C> AbciServer<R, C>
where
    R: RoundState + Send + 'static,
    C: TransactionCodec<Transaction = R::Transaction> + Send + 'static,
{
    /// Wrap a dispatcher
    pub fn new(app: RoundApp<R, C>) -> Self {
        Self {
            app: Arc::new(Mutex::new(app)),
        }
    }

    /// Handle to the dispatcher, for the code driving rounds
    pub fn app(&self) -> SharedRoundApp<R, C> {
        Arc::clone(&self.app)
    }

    /// Bind `addr` and serve until the listener fails
    ///
    /// Blocks the calling thread.
    pub fn serve(self, addr: impl ToSocketAddrs) -> Result<()> {
        let server = ServerBuilder::default()
            .bind(addr, self)
            .map_err(|e| Error::Abci(format!("failed to bind ABCI server: {}", e)))?;

        info!(addr = %server.local_addr(), "ABCI server listening");

        server
            .listen()
            .map_err(|e| Error::Abci(format!("ABCI server stopped: {}", e)))
    }
}

fn fatal(method: &str, err: impl Display) -> ! {
    error!(method, error = %err, "fatal ABCI error");
    panic!("fatal error in {}: {}", method, err)
}

impl<R, C> Application for AbciServer<R, C>
where
    R: RoundState + Send + 'static,
    C: TransactionCodec<Transaction = R::Transaction> + Send + 'static,
{
    fn info(&self, request: RequestInfo) -> ResponseInfo {
        self.app.lock().info(request)
    }

    fn begin_block(&self, request: RequestBeginBlock) -> ResponseBeginBlock {
        self.app
            .lock()
            .begin_block(request)
            .unwrap_or_else(|e| fatal("begin_block", e))
    }

    fn check_tx(&self, request: RequestCheckTx) -> ResponseCheckTx {
        self.app.lock().check_tx(request)
    }

    fn deliver_tx(&self, request: RequestDeliverTx) -> ResponseDeliverTx {
        self.app.lock().deliver_tx(request)
    }

    fn end_block(&self, request: RequestEndBlock) -> ResponseEndBlock {
        self.app
            .lock()
            .end_block(request)
            .unwrap_or_else(|e| fatal("end_block", e))
    }

    fn commit(&self) -> ResponseCommit {
        self.app
            .lock()
            .commit()
            .unwrap_or_else(|e| fatal("commit", e))
    }
}
