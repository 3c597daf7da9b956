mod judges;
mod run;
mod stats;

pub(crate) use run::{process, run};
