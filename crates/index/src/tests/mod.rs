mod concurrency;
mod scenario;
mod support;
