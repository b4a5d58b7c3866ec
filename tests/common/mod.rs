// Not every integration test binary uses every helper
#![allow(dead_code)]

pub mod test_helpers;
