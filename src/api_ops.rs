//! Interface boundary over the Kubernetes API writes. Abstracting
//! (get/create/patch/delete) behind `ApiOps<K>` lets tests inject a mock
//! with reactor-style failure injection instead of hitting a real API
//! server, while the production binary uses `KubeApiOps<K>` which is a
//! thin pass-through to `kube::Api<K>`.

use std::collections::HashMap;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Patch,
    PatchStatus,
    Delete,
}

#[async_trait]
pub trait ApiOps<K>: Send + Sync
where
    K: Clone + Send + Sync + 'static,
{
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K>;
    async fn list(&self, namespace: Option<&str>, params: &ListParams) -> Result<Vec<K>>;
    async fn create(&self, namespace: Option<&str>, object: &K) -> Result<K>;
    async fn patch_merge(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K>;
    async fn patch_status_merge(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K>;
    async fn replace(&self, namespace: Option<&str>, name: &str, object: &K) -> Result<K>;
    async fn delete(&self, namespace: Option<&str>, name: &str) -> Result<()>;
}

/// Production implementation: a thin pass-through to `kube::Api<K>`,
/// choosing namespaced vs cluster-scoped access per call based on the
/// caller-supplied namespace (mirrors how every reconciler already knows
/// whether it holds a namespaced or cluster-scoped object).
pub struct KubeApiOps<K> {
    client: Client,
    _marker: PhantomData<K>,
}

impl<K> KubeApiOps<K> {
    pub fn new(client: Client) -> Self {
        KubeApiOps {
            client,
            _marker: PhantomData,
        }
    }

    fn api(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<DynamicType = ()>,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

#[async_trait]
impl<K> ApiOps<K> for KubeApiOps<K>
where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K> {
        self.api(namespace).get(name).await.map_err(Error::Kube)
    }

    async fn list(&self, namespace: Option<&str>, params: &ListParams) -> Result<Vec<K>> {
        Ok(self.api(namespace).list(params).await?.items)
    }

    async fn create(&self, namespace: Option<&str>, object: &K) -> Result<K> {
        match self.api(namespace).create(&PostParams::default(), object).await {
            Ok(created) => Ok(created),
            // AlreadyExists is tolerated as success: a crash between
            // content-create and status-write is recovered by
            // deterministic naming on the next pass.
            Err(kube::Error::Api(resp)) if resp.code == 409 => {
                self.get(namespace, &object.name_any()).await
            }
            Err(e) => Err(Error::Kube(e)),
        }
    }

    async fn patch_merge(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K> {
        self.api(namespace)
            .patch(
                name,
                &PatchParams::apply("snapshot-controller"),
                &Patch::Merge(patch),
            )
            .await
            .map_err(Error::Kube)
    }

    async fn patch_status_merge(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K> {
        self.api(namespace)
            .patch_status(
                name,
                &PatchParams::apply("snapshot-controller"),
                &Patch::Merge(patch),
            )
            .await
            .map_err(Error::Kube)
    }

    async fn replace(&self, namespace: Option<&str>, name: &str, object: &K) -> Result<K> {
        self.api(namespace)
            .replace(name, &PostParams::default(), object)
            .await
            .map_err(Error::Kube)
    }

    async fn delete(&self, namespace: Option<&str>, name: &str) -> Result<()> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(Error::Kube(e)),
        }
    }
}

type Reactor = Box<dyn Fn(Verb, &str) -> Option<Error> + Send + Sync>;

/// In-memory mock with reactor-style failure injection, for unit and
/// end-to-end scenario tests.
pub struct MockApiOps<K> {
    objects: Arc<StdMutex<HashMap<String, K>>>,
    reactors: Arc<StdMutex<Vec<Reactor>>>,
}

impl<K> Clone for MockApiOps<K> {
    fn clone(&self) -> Self {
        MockApiOps {
            objects: self.objects.clone(),
            reactors: self.reactors.clone(),
        }
    }
}

impl<K: Clone> MockApiOps<K> {
    pub fn new() -> Self {
        MockApiOps {
            objects: Arc::new(StdMutex::new(HashMap::new())),
            reactors: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    pub fn seed(&self, key: impl Into<String>, object: K) {
        self.objects.lock().unwrap().insert(key.into(), object);
    }

    /// Install a reactor: called before every operation with the verb and
    /// the namespace/name key. Returning `Some(err)` fails that one call.
    pub fn react(&self, reactor: impl Fn(Verb, &str) -> Option<Error> + Send + Sync + 'static) {
        self.reactors.lock().unwrap().push(Box::new(reactor));
    }

    fn check_reactors(&self, verb: Verb, key: &str) -> Result<()> {
        for reactor in self.reactors.lock().unwrap().iter() {
            if let Some(err) = reactor(verb, key) {
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn snapshot_all(&self) -> Vec<K> {
        self.objects.lock().unwrap().values().cloned().collect()
    }
}

impl<K: Clone> Default for MockApiOps<K> {
    fn default() -> Self {
        Self::new()
    }
}

fn key_of(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{ns}/{name}"),
        None => name.to_string(),
    }
}

#[async_trait]
impl<K> ApiOps<K> for MockApiOps<K>
where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<K> {
        let key = key_of(namespace, name);
        self.check_reactors(Verb::Get, &key)?;
        self.objects
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key))
    }

    async fn list(&self, namespace: Option<&str>, _params: &ListParams) -> Result<Vec<K>> {
        self.check_reactors(Verb::List, namespace.unwrap_or(""))?;
        let prefix = namespace.map(|ns| format!("{ns}/"));
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| prefix.as_ref().map(|p| k.starts_with(p)).unwrap_or(true))
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn create(&self, namespace: Option<&str>, object: &K) -> Result<K> {
        let key = key_of(namespace, &object.name_any());
        self.check_reactors(Verb::Create, &key)?;
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Ok(objects.get(&key).unwrap().clone());
        }
        objects.insert(key, object.clone());
        Ok(object.clone())
    }

    async fn patch_merge(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K> {
        let key = key_of(namespace, name);
        self.check_reactors(Verb::Patch, &key)?;
        let mut objects = self.objects.lock().unwrap();
        let existing = objects
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.clone()))?;
        let merged = merge_json(&existing, patch)?;
        objects.insert(key, merged.clone());
        Ok(merged)
    }

    async fn patch_status_merge(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K> {
        let key = key_of(namespace, name);
        self.check_reactors(Verb::PatchStatus, &key)?;
        let mut objects = self.objects.lock().unwrap();
        let existing = objects
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.clone()))?;
        let merged = merge_json(&existing, patch)?;
        objects.insert(key, merged.clone());
        Ok(merged)
    }

    async fn replace(&self, namespace: Option<&str>, name: &str, object: &K) -> Result<K> {
        let key = key_of(namespace, name);
        self.check_reactors(Verb::Patch, &key)?;
        self.objects.lock().unwrap().insert(key, object.clone());
        Ok(object.clone())
    }

    async fn delete(&self, namespace: Option<&str>, name: &str) -> Result<()> {
        let key = key_of(namespace, name);
        self.check_reactors(Verb::Delete, &key)?;
        self.objects.lock().unwrap().remove(&key);
        Ok(())
    }
}

fn merge_json<K: Serialize + DeserializeOwned>(existing: &K, patch: &serde_json::Value) -> Result<K> {
    let mut value = serde_json::to_value(existing)?;
    json_patch::merge(&mut value, patch);
    Ok(serde_json::from_value(value)?)
}
