#![allow(clippy::doc_lazy_continuation)]

//! Bindings for the `eventbus.v1` protocol of the Salesforce Pub/Sub API.
//!
//! The generated output of `proto/pubsub_api.proto` is checked in so that
//! building the workspace does not require `protoc`. Only the RPCs this
//! repository consumes are bound: `Subscribe`, `GetSchema` and `GetTopic`.

pub mod eventbus {
    pub mod v1 {
        include!("eventbus.v1.rs");
    }
    pub const ENDPOINT: &str = "https://api.pubsub.salesforce.com:7443";
    pub const DE_ENDPOINT: &str = "https://api.deu.pubsub.salesforce.com:7443";
}
