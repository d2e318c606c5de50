use std::collections::BTreeMap;

pub const APPLICATION_LABEL: &str = "application";
pub const APPLICATION_NAME: &str = "pgkeeper";
pub const TEAM_LABEL: &str = "team";
pub const ROLE_LABEL: &str = "spilo-role";
pub const MASTER_ROLE: &str = "master";
pub const REPLICA_ROLE: &str = "replica";

/// Labels identifying every object belonging to a cluster, also used as the
/// teardown selector.
pub fn get_cluster_labels(cluster_name_label: &str, cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APPLICATION_LABEL.to_owned(), APPLICATION_NAME.to_owned()),
        (cluster_name_label.to_owned(), cluster_name.to_owned()),
    ])
}

pub fn get_team_cluster_labels(
    cluster_name_label: &str,
    cluster_name: &str,
    team: &str,
) -> BTreeMap<String, String> {
    let mut labels = get_cluster_labels(cluster_name_label, cluster_name);
    labels.insert(TEAM_LABEL.to_owned(), team.to_owned());

    labels
}

pub fn get_role_selector(
    cluster_name_label: &str,
    cluster_name: &str,
    role: &str,
) -> BTreeMap<String, String> {
    let mut labels = get_cluster_labels(cluster_name_label, cluster_name);
    labels.insert(ROLE_LABEL.to_owned(), role.to_owned());

    labels
}
