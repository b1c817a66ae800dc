mod helpers;

mod concurrency_tests;
mod read_tests;
mod recovery_tests;
