//! Readers for the cgroup v2 controller files and the procfs network tables of a container.
//!
//! Every reader takes a [`std::io::BufRead`] so it can be fed from a file or, in tests, from a
//! byte slice. [`super::sampler`] combines them into a [`crate::backend::ContainerStats`].

mod cpu;
pub(crate) mod error;
mod io;
mod memory;
mod net;
mod parser;
mod tcp;

pub use cpu::CpuStat;
pub use error::StatParseError;
pub use io::{DeviceIoStat, IoStat};
pub use memory::{MemoryCounter, MemoryEvents, MemoryStat};
pub use net::NetDev;
pub use parser::{FieldHandler, KeyValueStat, SingleLineStat};
pub use tcp::parse_tcp_states;
