pub mod body;
pub mod client;
pub mod codec;
pub mod constants;
pub mod consumer;
pub mod descriptor;
pub mod error;
pub mod format;
pub mod header;
pub mod memory;
pub mod mqi;
pub mod options;
pub mod render;
pub mod session;
pub mod wire;

pub use body::{DecodedBody, Rendered, decode_body, decode_text};
pub use client::ClientMqi;
pub use codec::{BridgeFrame, MqiCodec};
pub use consumer::{
    Consumer, ConsumerStats, MessageHandler, Outcome, PollPolicy, RetrievedMessage, StopHandle,
};
pub use descriptor::{MessageDescriptor, ObjectDescriptor};
pub use error::{
    CompletionCode, ConnectError, FormatError, GetError, MqError, OpenError, Reason,
    RetrievalError, WireError,
};
pub use format::Format;
pub use header::{DeadLetterHeader, DecodedMessage, Envelope, Property, Rfh2, dispatch};
pub use memory::MemoryQueueManager;
pub use mqi::{Hconn, Hobj, Mqi};
pub use options::{ClientAuth, ClientChannel, ConnectOptions, GetOptions, SslConfig, TlsVersion};
pub use render::render_message;
pub use session::{Queue, RetryPolicy, Session, connect_with_retry};

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::ControlFlow;

    #[tokio::test]
    async fn smoke_consume_one_text_message() {
        let qm = MemoryQueueManager::new("QM1");
        qm.enqueue_text("DEV.Q", "hello").await;

        let mut session = Session::connect(qm.clone(), "QM1", &ConnectOptions::default())
            .await
            .unwrap();
        let queue = session.open_queue("DEV.Q").await.unwrap();
        let stop = StopHandle::new();
        let mut seen = Vec::new();
        let stats = Consumer::new(queue, PollPolicy::default(), &stop)
            .run(&mut |m: &DecodedMessage| {
                seen.push(m.body.data.clone());
                ControlFlow::Break(())
            })
            .await
            .unwrap();
        session.disconnect().await;

        assert_eq!(seen, vec![b"hello".to_vec()]);
        assert_eq!(stats.messages, 1);
        assert_eq!(qm.open_handles().await, 0);
    }
}
