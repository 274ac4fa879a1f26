mod config_test;
mod context_test;
mod end_to_end_test;
mod guard_test;
mod promise_test;
mod transparency_test;
