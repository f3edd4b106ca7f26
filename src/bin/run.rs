use bytes::Bytes;
use clap::Parser;
use edge_sigv4_proxy::{
    config::ENV_SERVICE, decode_event, event::OriginDescriptor, signer::to_http_request,
    CredentialsCache, EdgeOutcome, EdgeRequest, EdgeSigner, ProxyConfig, SdkProvider,
};
use http::{Request, Uri, Version};
use http_body::Body as _;
use hyper::{Body, Client};
use log::info;
use std::{
    fs,
    io::{self, Read},
    str,
};

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Signs a CloudFront origin-request event with the credentials found in the environment.
#[derive(Debug, Parser)]
#[command(name = "run", version)]
struct Args {
    /// Event file to read, `-` for stdin.
    #[arg(long, default_value = "-")]
    event: String,

    /// Send the signed request to the origin and print the response body.
    #[arg(long)]
    forward: bool,

    /// Service name used in the credential scope.
    #[arg(long, env = ENV_SERVICE)]
    service: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    let args = Args::parse();

    let mut config = ProxyConfig::from_env()?;
    if let Some(service) = args.service {
        config.service = service;
    }

    let raw = read_event(&args.event)?;
    let event = decode_event(&raw)?;
    let provider = SdkProvider::default_chain().await;
    let signer = EdgeSigner::new(config, CredentialsCache::new(provider));
    let outcome = signer.handle_event(event).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if args.forward {
        match outcome {
            EdgeOutcome::Forward(request) => forward(request).await?,
            EdgeOutcome::Respond(_) => info!("answered at the edge, nothing to forward"),
        }
    }
    Ok(())
}

fn read_event(path: &str) -> Result<Vec<u8>, Error> {
    if path == "-" {
        let mut raw = vec![];
        io::stdin().read_to_end(&mut raw)?;
        Ok(raw)
    } else {
        Ok(fs::read(path)?)
    }
}

async fn forward(request: EdgeRequest) -> Result<(), Error> {
    let base_url = match &request.origin {
        Some(OriginDescriptor::Custom(origin)) => origin.base_url(),
        _ => return Err("signed request has no custom origin".into()),
    };
    let uri: Uri = format!("{}{}", base_url, request.path_and_query()).parse()?;
    info!("forwarding {} {}", request.method, uri);

    let mut req = to_http_request(&request)?;
    *req.uri_mut() = uri;
    *req.version_mut() = Version::HTTP_11;

    let https = hyper_tls::HttpsConnector::new();
    let client: Client<_, hyper::Body> = Client::builder().build(https);
    let mut res = client.request(reconstruct(req)).await?;
    info!("origin responded {}", res.status());

    let mut body = vec![];
    while let Some(chunk) = res.body_mut().data().await {
        body.extend_from_slice(&chunk?);
    }
    println!("{}", str::from_utf8(&body)?);
    Ok(())
}

fn reconstruct(req: Request<Bytes>) -> Request<Body> {
    let (parts, body) = req.into_parts();
    Request::from_parts(parts, Body::from(body))
}
