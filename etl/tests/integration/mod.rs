mod http_source_test;
mod pipeline_test;
mod postgres_destination_test;
