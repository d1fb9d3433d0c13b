//! Wire message taxonomy and the dispatcher that routes inbound peer
//! messages into the ledger and decides what, if anything, to send back.
//! The dispatcher owns no state of its own beyond the message shapes; it
//! operates entirely on the `Ledger` handed to it.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::Block;
use crate::error::ErrorKind;
use crate::ledger::Ledger;
use crate::transaction::Transaction;

/// The four message kinds peers exchange. Field names (`type`, `content`,
/// `index`) are part of the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    BroadcastTx {
        content: Transaction,
    },
    /// `index` is the sender's chain length before it appended this
    /// block, i.e. the position the block occupies.
    BroadcastBlock {
        content: Block,
        index: usize,
    },
    /// `content` is the requester's current chain length.
    RequestChain {
        content: usize,
    },
    ResponseChain {
        content: Vec<Block>,
    },
}

/// What the dispatcher asks the transport layer to do after handling an
/// inbound message. The dispatcher never opens a socket itself.
#[derive(Debug, Clone)]
pub enum OutboundAction {
    Broadcast(Message),
    Unicast(Message),
}

/// Where a `broadcast_block`'s `index` places it relative to the local chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockPosition {
    ExtendsLocalTip,
    SenderBehind,
    LocalBehind,
}

fn classify_block_position(index: usize, local_chain_len: usize) -> BlockPosition {
    if index == local_chain_len {
        BlockPosition::ExtendsLocalTip
    } else if index < local_chain_len {
        BlockPosition::SenderBehind
    } else {
        BlockPosition::LocalBehind
    }
}

/// Routes one inbound message into `ledger`, returning whatever outbound
/// actions the caller should perform. Malformed decode is the caller's
/// concern (this function only sees already-decoded messages); here we
/// only handle semantically invalid content, which is logged and
/// swallowed rather than propagated, per the propagation policy: a
/// rejected message never stops the dispatcher from handling the next one.
pub fn dispatch(ledger: &mut Ledger, message: Message) -> Vec<OutboundAction> {
    match message {
        Message::BroadcastTx { content } => {
            if let Err(err) = ledger.apply_inbound_tx(content) {
                debug!(error = %err, "dropped broadcast_tx");
            }
            Vec::new()
        }

        Message::BroadcastBlock { content, index } => {
            let local_len = ledger.chain().len();
            match classify_block_position(index, local_len) {
                BlockPosition::ExtendsLocalTip => {
                    if let Err(err) = ledger.receive_block(content) {
                        debug!(error = %err, "rejected broadcast_block extending local tip");
                    }
                    Vec::new()
                }
                BlockPosition::SenderBehind => {
                    // The sender's own chain has length `index` (it broadcast
                    // this block as `index = its chain length`), so it has no
                    // block at all past that point yet — send the full local
                    // chain, not just the tail, or its `resolve_conflicts`
                    // will compare our genesis against whatever block sits at
                    // `index` and reject with `UnknownGenesis`.
                    let snapshot: Vec<Block> = ledger.chain().to_vec();
                    vec![OutboundAction::Unicast(Message::ResponseChain { content: snapshot })]
                }
                BlockPosition::LocalBehind => {
                    vec![OutboundAction::Broadcast(Message::RequestChain { content: local_len })]
                }
            }
        }

        Message::RequestChain { content: requester_len } => {
            if ledger.chain().len() > requester_len {
                vec![OutboundAction::Unicast(Message::ResponseChain {
                    content: ledger.chain().to_vec(),
                })]
            } else {
                Vec::new()
            }
        }

        Message::ResponseChain { content } => {
            match ledger.resolve_conflicts(content) {
                Ok(true) => debug!("fork resolution replaced the local chain"),
                Ok(false) => debug!("fork resolution kept the local chain"),
                Err(err) => debug!(error = %err, "fork resolution candidate rejected"),
            }
            Vec::new()
        }
    }
}

/// Builds the `broadcast_block` message for a newly mined or accepted
/// block, with `index` pinned to "length of the local chain before this
/// block was appended".
pub fn broadcast_block_message(block: Block, pre_append_len: usize) -> Message {
    Message::BroadcastBlock {
        content: block,
        index: pre_append_len,
    }
}

/// Decodes a raw wire datagram, rejecting it before parsing if it exceeds
/// `max_message_size` (see `Config::max_message_size`). The core assumes
/// the transport delivers whole messages (§6); this is the one size check
/// it still owns, since an oversized payload is a protocol-level decision,
/// not a transport framing detail.
pub fn decode_message(bytes: &[u8], max_message_size: usize) -> Result<Message, ErrorKind> {
    if bytes.len() > max_message_size {
        return Err(ErrorKind::MessageTooLarge(bytes.len(), max_message_size));
    }
    serde_json::from_slice(bytes).map_err(|e| ErrorKind::Serialization(e.to_string()))
}
