mod registry;
mod run;
#[cfg(test)]
mod tests;

pub(crate) use run::run;
