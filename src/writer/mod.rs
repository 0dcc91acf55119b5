pub mod mdf_writer;
pub mod sample_queue;
pub mod stream_writer;

pub use mdf_writer::MdfWriter;
pub use sample_queue::{SampleRecord, WriteState};
pub use stream_writer::MdfStreamWriter;
