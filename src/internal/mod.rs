pub(crate) mod skiplist;
#[cfg(test)]
pub(crate) mod test_alloc;
pub(crate) mod utils;
