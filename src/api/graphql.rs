use std::sync::Arc;

use async_graphql::{Context, EmptyMutation, EmptySubscription, Object, Schema, ID};

use crate::api::serializers::{ClusterPayload, NotePayload, OsdPayload, Serializer};
use crate::config::ServerConfig;
use crate::domain::registry_service::RegistryService;

pub type RegistrySchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

pub struct QueryRoot;

fn parse_id(id: &ID) -> async_graphql::Result<u64> {
    id.parse::<u64>()
        .map_err(|_| async_graphql::Error::new(format!("invalid id: {}", id.as_str())))
}

#[Object]
impl QueryRoot {
    async fn clusters(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<ClusterPayload>> {
        let svc = ctx.data::<Arc<RegistryService>>()?;
        let base = &ctx.data::<Arc<ServerConfig>>()?.public_url;
        Ok(svc
            .read(|inv| {
                let s = Serializer::new(inv, base);
                inv.clusters().into_iter().map(|c| s.cluster(c)).collect()
            })
            .await)
    }

    async fn cluster(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Option<ClusterPayload>> {
        let id = parse_id(&id)?;
        let svc = ctx.data::<Arc<RegistryService>>()?;
        let base = &ctx.data::<Arc<ServerConfig>>()?.public_url;
        Ok(svc
            .read(|inv| inv.cluster(id).map(|c| Serializer::new(inv, base).cluster(c)))
            .await)
    }

    /// OSDs, optionally narrowed to one cluster and/or one device.
    async fn osds(
        &self,
        ctx: &Context<'_>,
        cluster_id: Option<ID>,
        device_id: Option<ID>,
    ) -> async_graphql::Result<Vec<OsdPayload>> {
        let cluster_id = cluster_id.as_ref().map(parse_id).transpose()?;
        let device_id = device_id.as_ref().map(parse_id).transpose()?;
        let svc = ctx.data::<Arc<RegistryService>>()?;
        let base = &ctx.data::<Arc<ServerConfig>>()?.public_url;
        Ok(svc
            .read(|inv| {
                let s = Serializer::new(inv, base);
                inv.osds()
                    .into_iter()
                    .filter(|o| cluster_id.is_none_or(|c| o.cluster == Some(c)))
                    .filter(|o| device_id.is_none_or(|d| o.device == d))
                    .map(|o| s.osd(o))
                    .collect()
            })
            .await)
    }

    async fn osd(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Option<OsdPayload>> {
        let id = parse_id(&id)?;
        let svc = ctx.data::<Arc<RegistryService>>()?;
        let base = &ctx.data::<Arc<ServerConfig>>()?.public_url;
        Ok(svc
            .read(|inv| inv.osd(id).map(|o| Serializer::new(inv, base).osd(o)))
            .await)
    }

    /// Status notes, newest first.
    async fn notes(
        &self,
        ctx: &Context<'_>,
        osd_id: Option<ID>,
        resolved: Option<bool>,
    ) -> async_graphql::Result<Vec<NotePayload>> {
        let osd_id = osd_id.as_ref().map(parse_id).transpose()?;
        let svc = ctx.data::<Arc<RegistryService>>()?;
        let base = &ctx.data::<Arc<ServerConfig>>()?.public_url;
        Ok(svc
            .read(|inv| {
                let s = Serializer::new(inv, base);
                inv.notes()
                    .into_iter()
                    .filter(|n| osd_id.is_none_or(|o| n.osd == o))
                    .filter(|n| resolved.is_none_or(|r| n.resolved == r))
                    .map(|n| s.note(n))
                    .collect()
            })
            .await)
    }

    /// The OSDs hosted on one device (the device page panel).
    async fn device_osds(&self, ctx: &Context<'_>, device_id: ID) -> async_graphql::Result<Vec<OsdPayload>> {
        let device_id = parse_id(&device_id)?;
        let svc = ctx.data::<Arc<RegistryService>>()?;
        let base = &ctx.data::<Arc<ServerConfig>>()?.public_url;
        svc.read(|inv| -> async_graphql::Result<Vec<OsdPayload>> {
            inv.device(device_id)
                .ok_or_else(|| async_graphql::Error::new(format!("Device {device_id} not found")))?;
            let s = Serializer::new(inv, base);
            Ok(inv.device_osds(device_id).into_iter().map(|o| s.osd(o)).collect())
        })
        .await
    }
}

pub fn build_schema(service: Arc<RegistryService>, config: Arc<ServerConfig>) -> RegistrySchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(service)
        .data(config)
        .finish()
}
