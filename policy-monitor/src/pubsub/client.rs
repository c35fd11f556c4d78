use crate::client;
use salesforce_pubsub_v1::eventbus::v1::pub_sub_client::PubSubClient;
use tokio_stream::Stream;

/// Errors that can occur during Pub/Sub operations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Access token is missing from the auth client.
    #[error("Access token missing")]
    MissingToken,
    /// Required client attribute is missing.
    #[error("Missing required attribute: {}", _0)]
    MissingRequiredAttribute(String),
    /// Failed to create valid gRPC metadata from client credentials.
    #[error("Invalid metadata value for gRPC headers: {source}")]
    InvalidMetadataValue {
        #[source]
        source: tonic::metadata::errors::InvalidMetadataValue,
    },
    /// gRPC communication error.
    #[error("gRPC transport error: {0}")]
    Tonic(Box<tonic::Status>),
}

struct AuthInterceptor {
    auth_header: tonic::metadata::AsciiMetadataValue,
    instance_url: tonic::metadata::AsciiMetadataValue,
    tenant_id: tonic::metadata::AsciiMetadataValue,
}

impl tonic::service::Interceptor for AuthInterceptor {
    fn call(
        &mut self,
        mut request: tonic::Request<()>,
    ) -> Result<tonic::Request<()>, tonic::Status> {
        request
            .metadata_mut()
            .insert("accesstoken", self.auth_header.to_owned());
        request
            .metadata_mut()
            .insert("instanceurl", self.instance_url.to_owned());
        request
            .metadata_mut()
            .insert("tenantid", self.tenant_id.to_owned());
        Ok(request)
    }
}

/// Pub/Sub API client for making gRPC calls.
///
/// Attaches the authentication metadata Salesforce expects to every call
/// and exposes the topic, schema and subscribe operations the monitor uses.
#[derive(Debug)]
pub struct Client {
    pubsub: PubSubClient<
        tonic::service::interceptor::InterceptedService<
            tonic::transport::Channel,
            AuthInterceptor,
        >,
    >,
}

impl Client {
    /// Creates a new Pub/Sub client from a connected auth client.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth client is missing required
    /// authentication data or a value is not valid gRPC metadata.
    pub fn new(channel: tonic::transport::Channel, auth: client::Client) -> Result<Self, Error> {
        let token = auth
            .current_access_token()
            .map_err(|_| Error::MissingToken)?;

        let auth_header: tonic::metadata::AsciiMetadataValue = token
            .parse()
            .map_err(|e| Error::InvalidMetadataValue { source: e })?;

        let instance_url: tonic::metadata::AsciiMetadataValue = auth
            .instance_url()
            .map_err(|_| Error::MissingRequiredAttribute("instance_url".to_string()))?
            .parse()
            .map_err(|e| Error::InvalidMetadataValue { source: e })?;

        let tenant_id: tonic::metadata::AsciiMetadataValue = auth
            .tenant_id
            .as_ref()
            .ok_or_else(|| Error::MissingRequiredAttribute("tenant_id".to_string()))?
            .parse()
            .map_err(|e| Error::InvalidMetadataValue { source: e })?;

        let interceptor = AuthInterceptor {
            auth_header,
            instance_url,
            tenant_id,
        };

        let pubsub = PubSubClient::with_interceptor(channel, interceptor);

        Ok(Client { pubsub })
    }

    /// Retrieves topic metadata.
    ///
    /// Returns information about a topic including schema ID, permissions,
    /// and RPC ID.
    pub async fn get_topic(
        &mut self,
        request: salesforce_pubsub_v1::eventbus::v1::TopicRequest,
    ) -> Result<tonic::Response<salesforce_pubsub_v1::eventbus::v1::TopicInfo>, Error> {
        self.pubsub
            .get_topic(tonic::Request::new(request))
            .await
            .map_err(|e| Error::Tonic(Box::new(e)))
    }

    /// Retrieves schema information for a schema id.
    ///
    /// Returns the Avro schema definition in JSON form.
    pub async fn get_schema(
        &mut self,
        request: salesforce_pubsub_v1::eventbus::v1::SchemaRequest,
    ) -> Result<tonic::Response<salesforce_pubsub_v1::eventbus::v1::SchemaInfo>, Error> {
        self.pubsub
            .get_schema(tonic::Request::new(request))
            .await
            .map_err(|e| Error::Tonic(Box::new(e)))
    }

    /// Subscribes to events from a topic.
    ///
    /// The caller supplies the stream of fetch requests; see
    /// [`fetch_request_stream`](super::fetch_request_stream) for the
    /// flow-controlled stream the monitor uses. Returns a stream of event
    /// batches that continues until an error occurs or the request stream
    /// ends.
    pub async fn subscribe<S>(
        &mut self,
        requests: S,
    ) -> Result<
        tonic::Response<
            tonic::codec::Streaming<salesforce_pubsub_v1::eventbus::v1::FetchResponse>,
        >,
        Error,
    >
    where
        S: Stream<Item = salesforce_pubsub_v1::eventbus::v1::FetchRequest> + Send + 'static,
    {
        self.pubsub
            .subscribe(requests)
            .await
            .map_err(|e| Error::Tonic(Box::new(e)))
    }
}
