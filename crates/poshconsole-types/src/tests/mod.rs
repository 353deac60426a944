mod error_record_test;
mod value_test;
