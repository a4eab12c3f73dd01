//! Typed HTTP helpers for the outbound calls: the naming service commanding
//! storage nodes, storage nodes registering and pulling from peers.

use bytes::Bytes;
use data_encoding::BASE64;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::{
    CopyRequest, ErrorBody, PathRequest, ReadRequest, ReadResponse, RegisterRequest,
    RegisterResponse, SizeResponse, SuccessResponse,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote {}: {}", .0.exception_type, .0.exception_info)]
    Remote(ErrorBody),

    #[error("invalid response payload: {0}")]
    Decode(String),
}

/// Thin wrapper around a shared [reqwest::Client]. Endpoints are addressed by
/// host and port; every call POSTs a JSON body and decodes either the
/// expected response or the error envelope.
#[derive(Clone, Default)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        HttpClient::default()
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        host: &str,
        port: u16,
        endpoint: &str,
        body: &Req,
    ) -> Result<Resp, ClientError> {
        let url = format!("http://{}:{}/{}", host, port, endpoint);
        let response = self.inner.post(url).json(body).send().await?;

        if response.status().is_success() {
            let bytes = response.bytes().await?;
            serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
        } else {
            let envelope: ErrorBody = response
                .json()
                .await
                .map_err(|e| ClientError::Decode(e.to_string()))?;
            Err(ClientError::Remote(envelope))
        }
    }

    /// Registers a storage node with the naming service. The returned list
    /// holds the files the node must delete locally.
    pub async fn register(
        &self,
        naming_ip: &str,
        registration_port: u16,
        request: &RegisterRequest,
    ) -> Result<RegisterResponse, ClientError> {
        self.post(naming_ip, registration_port, "register", request)
            .await
    }

    pub async fn storage_create(
        &self,
        host: &str,
        command_port: u16,
        path: &str,
    ) -> Result<bool, ClientError> {
        let resp: SuccessResponse = self
            .post(
                host,
                command_port,
                "storage_create",
                &PathRequest {
                    path: path.to_owned(),
                },
            )
            .await?;
        Ok(resp.success)
    }

    pub async fn storage_delete(
        &self,
        host: &str,
        command_port: u16,
        path: &str,
    ) -> Result<bool, ClientError> {
        let resp: SuccessResponse = self
            .post(
                host,
                command_port,
                "storage_delete",
                &PathRequest {
                    path: path.to_owned(),
                },
            )
            .await?;
        Ok(resp.success)
    }

    /// Tells the node behind `command_port` to pull `path` from the peer
    /// named in the request.
    pub async fn storage_copy(
        &self,
        host: &str,
        command_port: u16,
        request: &CopyRequest,
    ) -> Result<bool, ClientError> {
        let resp: SuccessResponse = self.post(host, command_port, "storage_copy", request).await?;
        Ok(resp.success)
    }

    pub async fn storage_size(
        &self,
        host: &str,
        client_port: u16,
        path: &str,
    ) -> Result<u64, ClientError> {
        let resp: SizeResponse = self
            .post(
                host,
                client_port,
                "storage_size",
                &PathRequest {
                    path: path.to_owned(),
                },
            )
            .await?;
        Ok(resp.size)
    }

    /// Reads `length` bytes at `offset`, decoding the base64 payload.
    pub async fn storage_read(
        &self,
        host: &str,
        client_port: u16,
        path: &str,
        offset: i64,
        length: i64,
    ) -> Result<Bytes, ClientError> {
        let resp: ReadResponse = self
            .post(
                host,
                client_port,
                "storage_read",
                &ReadRequest {
                    path: path.to_owned(),
                    offset,
                    length,
                },
            )
            .await?;
        let data = BASE64
            .decode(resp.data.as_bytes())
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(data.into())
    }
}
