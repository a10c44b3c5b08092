pub mod modernize;
