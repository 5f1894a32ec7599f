pub mod instruction_reader;
pub mod ledger_writer;
