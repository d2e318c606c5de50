use kube::{api::PatchParams, Client, CustomResourceExt};

use crate::kubernetes::operations::apply_crd;

use self::postgresql::Postgresql;

pub mod postgresql;

pub async fn create_v1alpha1_crds(
    client: &Client,
    apply_params: &PatchParams,
) -> anyhow::Result<()> {
    let postgresql_spec = Postgresql::crd();

    apply_crd(client, &postgresql_spec, apply_params).await?;

    Ok(())
}
