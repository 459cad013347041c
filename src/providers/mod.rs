pub mod http_channel;
