mod backoff;
mod version;
