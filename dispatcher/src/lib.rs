//! camrec dispatcher – bounded-concurrency stream recording.
//!
//! A request is acknowledged as soon as its job is queued on the
//! [`pool::WorkerPool`]; a worker then runs the [`recorder::Recorder`] and
//! hands the outcome to the [`forwarder::UploadSink`].

pub mod dispatcher;
pub mod forwarder;
pub mod pool;
pub mod recorder;
pub mod server;
