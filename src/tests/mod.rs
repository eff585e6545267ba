pub mod common;

mod microsoft_adapter;
