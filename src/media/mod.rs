//! The live-streaming data plane: packet/codec model, message queue,
//! consumer, GOP cache, source hub, and format bridgers.

pub mod bridger;
pub mod codec;
pub mod consumer;
pub mod gop_cache;
pub mod packet;
pub mod queue;
pub mod source;
