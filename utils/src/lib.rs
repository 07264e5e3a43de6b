pub mod framegen;
