//! Scenario and invariant tests for the transfer queue.

mod helpers;

mod basic;
