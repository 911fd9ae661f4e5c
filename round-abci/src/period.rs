//! Round state consumed by the ABCI dispatcher
//!
//! The dispatcher funnels every state change through a [`RoundState`]. The
//! node ships [`Period`], an in-memory state that assembles committed blocks
//! into a [`Blockchain`] and can be closed to new transactions between rounds.

use crate::{error::TxError, Error, Result};
use tendermint_proto::v0_37::types::Header;
use tracing::{debug, info};

/// State machine the ABCI calls are forwarded to
pub trait RoundState {
    /// Decoded transaction type
    type Transaction;

    /// Height of the last committed block
    fn height(&self) -> i64;

    /// Start a block
    fn begin_block(&mut self, header: Header) -> Result<()>;

    /// Fails with [`TxError::LateArriving`] once the round stopped accepting
    /// transactions
    fn check_is_finished(&self) -> std::result::Result<(), TxError>;

    /// Apply a transaction to the block in progress
    fn deliver_tx(&mut self, transaction: Self::Transaction) -> std::result::Result<(), TxError>;

    /// Close the block in progress
    fn end_block(&mut self) -> Result<()>;

    /// Append the block to the chain; [`Error::AddBlock`] leaves the chain
    /// inconsistent
    fn commit(&mut self) -> Result<()>;
}

/// Committed block
#[derive(Debug, Clone, PartialEq)]
pub struct Block<T> {
    header: Header,
    transactions: Vec<T>,
}

impl<T> Block<T> {
    /// Block header
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Block height
    pub fn height(&self) -> i64 {
        self.header.height
    }

    /// Transactions in delivery order
    pub fn transactions(&self) -> &[T] {
        &self.transactions
    }
}

/// Ordered list of committed blocks
#[derive(Debug, Clone)]
pub struct Blockchain<T> {
    blocks: Vec<Block<T>>,
}

impl<T> Default for Blockchain<T> {
    fn default() -> Self {
        Self { blocks: Vec::new() }
    }
}

impl<T> Blockchain<T> {
    /// Height of the tip, 0 when empty
    pub fn height(&self) -> i64 {
        self.blocks.last().map_or(0, Block::height)
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no block was committed yet
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Tip of the chain
    pub fn last_block(&self) -> Option<&Block<T>> {
        self.blocks.last()
    }

    /// Append a block; its height must directly follow the tip
    pub fn add_block(&mut self, block: Block<T>) -> Result<()> {
        let expected = self.height() + 1;
        if block.height() != expected {
            return Err(Error::AddBlock(format!(
                "expected height {}, got {}",
                expected,
                block.height()
            )));
        }
        self.blocks.push(block);
        Ok(())
    }
}

/// In-memory round state
#[derive(Debug)]
pub struct Period<T> {
    blockchain: Blockchain<T>,
    current_header: Option<Header>,
    block_transactions: Vec<T>,
    round_finished: bool,
}

impl<T> Default for Period<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Period<T> {
    /// Empty period with an open round
    pub fn new() -> Self {
        Self {
            blockchain: Blockchain::default(),
            current_header: None,
            block_transactions: Vec::new(),
            round_finished: false,
        }
    }

    /// Committed blocks
    pub fn blockchain(&self) -> &Blockchain<T> {
        &self.blockchain
    }

    /// Transactions delivered in the block in progress
    pub fn pending_transactions(&self) -> &[T] {
        &self.block_transactions
    }

    /// Stop accepting transactions
    pub fn finish_round(&mut self) {
        info!(height = self.blockchain.height(), "round finished");
        self.round_finished = true;
    }

    /// Accept transactions again
    pub fn start_round(&mut self) {
        info!(height = self.blockchain.height(), "round started");
        self.round_finished = false;
    }

    /// Whether the round stopped accepting transactions
    pub fn is_round_finished(&self) -> bool {
        self.round_finished
    }
}

impl<T> RoundState for Period<T> {
    type Transaction = T;

    fn height(&self) -> i64 {
        self.blockchain.height()
    }

    fn begin_block(&mut self, header: Header) -> Result<()> {
        if let Some(current) = &self.current_header {
            return Err(Error::Round(format!(
                "block {} is still in progress",
                current.height
            )));
        }
        debug!(height = header.height, "begin block");
        self.current_header = Some(header);
        self.block_transactions.clear();
        Ok(())
    }

    fn check_is_finished(&self) -> std::result::Result<(), TxError> {
        if self.round_finished {
            return Err(TxError::LateArriving(
                "round is finished, cannot accept new transactions".to_string(),
            ));
        }
        Ok(())
    }

    fn deliver_tx(&mut self, transaction: T) -> std::result::Result<(), TxError> {
        if self.current_header.is_none() {
            return Err(TxError::TransactionNotValid(
                "no block in progress".to_string(),
            ));
        }
        self.block_transactions.push(transaction);
        Ok(())
    }

    fn end_block(&mut self) -> Result<()> {
        debug!(
            transactions = self.block_transactions.len(),
            "end block"
        );
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let header = self
            .current_header
            .take()
            .ok_or_else(|| Error::AddBlock("no block in progress".to_string()))?;

        let block = Block {
            header,
            transactions: std::mem::take(&mut self.block_transactions),
        };
        self.blockchain.add_block(block)?;

        info!(height = self.blockchain.height(), "block committed");
        Ok(())
    }
}
