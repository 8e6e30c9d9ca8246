use anyhow::Result;
use stratus::Reading;

pub mod bus;

/// A reading that has just been written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub reading: Reading,
    /// name of the station at the time of the write
    pub station_name: String,
}

#[async_trait]
pub trait RecordConsumer: Send {
    /// handle a freshly persisted reading.
    async fn handle(&mut self, record: &Record) -> Result<()>;
    /// called once when the router shuts down
    async fn close(self: Box<Self>) {}
}
