//! Certificate intents

use chrono::Utc;
use nodeplane_db::entities::tls_cert;
use nodeplane_proto::{CertPayload, Command};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{non_empty, Reconciler};
use crate::error::{Applied, ControlError, ControlResult, SyncOutcome};

/// A certificate to store for a node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CertSpec {
    pub node_id: i64,
    pub domain: String,
    /// Certificate chain (PEM)
    pub public_key: Option<String>,
    /// Private key (PEM)
    pub private_key: Option<String>,
    pub auto_renew: bool,
    pub expire_time: Option<i64>,
}

impl Reconciler {
    /// Store a certificate and deploy it when both key halves are present
    pub async fn create_cert(&self, spec: CertSpec) -> ControlResult<Applied<tls_cert::Model>> {
        let domain = spec.domain.trim().to_string();
        if domain.is_empty() {
            return Err(ControlError::validation("domain is required"));
        }
        let node = self.find_node(spec.node_id).await?;

        let now = Utc::now();
        let model = tls_cert::ActiveModel {
            node_id: Set(node.id),
            domain: Set(domain),
            public_key: Set(non_empty(spec.public_key)),
            private_key: Set(non_empty(spec.private_key)),
            auto_renew: Set(spec.auto_renew),
            expire_time: Set(spec.expire_time),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let created = model.insert(&self.db).await?;

        info!(
            node_id = node.id,
            cert_id = created.id,
            domain = %created.domain,
            "Certificate stored"
        );

        let sync = self.push_cert(&created).await;
        Ok(Applied::new(created, sync))
    }

    /// Push a stored certificate to its node again
    pub async fn deploy_cert(&self, cert_id: i64) -> ControlResult<Applied<tls_cert::Model>> {
        let cert = self.find_cert(cert_id).await?;
        if !cert.is_complete() {
            return Err(ControlError::validation(format!(
                "certificate {} is missing key material",
                cert_id
            )));
        }

        let sync = self.push_cert(&cert).await;
        Ok(Applied::new(cert, sync))
    }

    /// Remove a certificate from storage; nodes keep files already deployed
    pub async fn delete_cert(&self, cert_id: i64) -> ControlResult<tls_cert::Model> {
        let cert = self.find_cert(cert_id).await?;
        tls_cert::Entity::delete_by_id(cert_id)
            .exec(&self.db)
            .await?;

        info!(cert_id, domain = %cert.domain, "Certificate deleted");
        Ok(cert)
    }

    pub async fn list_certs(&self, node_id: Option<i64>) -> ControlResult<Vec<tls_cert::Model>> {
        let mut query = tls_cert::Entity::find().order_by_asc(tls_cert::Column::Id);
        if let Some(node_id) = node_id {
            query = query.filter(tls_cert::Column::NodeId.eq(node_id));
        }
        Ok(query.all(&self.db).await?)
    }

    pub(super) async fn push_cert(&self, cert: &tls_cert::Model) -> SyncOutcome {
        match cert_command(cert) {
            Some(command) => self.propagate(cert.node_id, command).await,
            None => {
                debug!(cert_id = cert.id, "Certificate incomplete, not deployed");
                SyncOutcome::Skipped
            }
        }
    }

    async fn find_cert(&self, cert_id: i64) -> ControlResult<tls_cert::Model> {
        tls_cert::Entity::find_by_id(cert_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ControlError::not_found(format!("certificate {} not found", cert_id)))
    }
}

/// `DeployCert` for a certificate with both key halves
pub(super) fn cert_command(cert: &tls_cert::Model) -> Option<Command> {
    if !cert.is_complete() {
        return None;
    }
    Some(Command::DeployCert(CertPayload {
        domain: cert.domain.clone(),
        public_key: cert.public_key.clone().unwrap_or_default(),
        private_key: cert.private_key.clone().unwrap_or_default(),
    }))
}
