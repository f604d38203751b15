//! Namespace, Pod, Deployment and StatefulSet operations

use crate::error::E2eResult;
use crate::kubernetes::client::K8sClient;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, LogParams, PostParams};

/// Create a namespace named after `generate_name`
pub async fn create_namespace(client: &K8sClient, generate_name: &str) -> E2eResult<Namespace> {
    let namespaces: Api<Namespace> = Api::all(client.inner().clone());

    let namespace = Namespace {
        metadata: ObjectMeta {
            generate_name: Some(generate_name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    Ok(namespaces.create(&PostParams::default(), &namespace).await?)
}

/// Delete a namespace
pub async fn delete_namespace(client: &K8sClient, name: &str) -> E2eResult<()> {
    let namespaces: Api<Namespace> = Api::all(client.inner().clone());
    namespaces.delete(name, &DeleteParams::default()).await?;

    Ok(())
}

/// Create a pod
pub async fn create_pod(client: &K8sClient, namespace: &str, pod: &Pod) -> E2eResult<Pod> {
    let pods: Api<Pod> = Api::namespaced(client.inner().clone(), namespace);
    Ok(pods.create(&PostParams::default(), pod).await?)
}

/// Get a single pod
pub async fn get_pod(client: &K8sClient, namespace: &str, name: &str) -> E2eResult<Pod> {
    let pods: Api<Pod> = Api::namespaced(client.inner().clone(), namespace);
    Ok(pods.get(name).await?)
}

/// Delete a pod
pub async fn delete_pod(client: &K8sClient, namespace: &str, name: &str) -> E2eResult<()> {
    let pods: Api<Pod> = Api::namespaced(client.inner().clone(), namespace);
    pods.delete(name, &DeleteParams::default()).await?;

    Ok(())
}

/// Get pod logs
pub async fn get_pod_logs(client: &K8sClient, namespace: &str, name: &str) -> E2eResult<String> {
    let pods: Api<Pod> = Api::namespaced(client.inner().clone(), namespace);
    Ok(pods.logs(name, &LogParams::default()).await?)
}

/// Create a deployment
pub async fn create_deployment(
    client: &K8sClient,
    namespace: &str,
    deployment: &Deployment,
) -> E2eResult<Deployment> {
    let deployments: Api<Deployment> = Api::namespaced(client.inner().clone(), namespace);
    Ok(deployments.create(&PostParams::default(), deployment).await?)
}

/// Get a single deployment
pub async fn get_deployment(client: &K8sClient, namespace: &str, name: &str) -> E2eResult<Deployment> {
    let deployments: Api<Deployment> = Api::namespaced(client.inner().clone(), namespace);
    Ok(deployments.get(name).await?)
}

/// Delete a deployment
pub async fn delete_deployment(client: &K8sClient, namespace: &str, name: &str) -> E2eResult<()> {
    let deployments: Api<Deployment> = Api::namespaced(client.inner().clone(), namespace);
    deployments.delete(name, &DeleteParams::foreground()).await?;

    Ok(())
}

/// Create a StatefulSet
pub async fn create_statefulset(
    client: &K8sClient,
    namespace: &str,
    statefulset: &StatefulSet,
) -> E2eResult<StatefulSet> {
    let sts: Api<StatefulSet> = Api::namespaced(client.inner().clone(), namespace);
    Ok(sts.create(&PostParams::default(), statefulset).await?)
}

/// Get a specific StatefulSet
pub async fn get_statefulset(client: &K8sClient, namespace: &str, name: &str) -> E2eResult<StatefulSet> {
    let sts: Api<StatefulSet> = Api::namespaced(client.inner().clone(), namespace);
    Ok(sts.get(name).await?)
}

/// Delete a StatefulSet
pub async fn delete_statefulset(client: &K8sClient, namespace: &str, name: &str) -> E2eResult<()> {
    let sts: Api<StatefulSet> = Api::namespaced(client.inner().clone(), namespace);
    sts.delete(name, &DeleteParams::foreground()).await?;

    Ok(())
}
