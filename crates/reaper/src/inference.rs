//! Dependency and ownership inference
//!
//! Resources are observed kind by kind in [`ResourceKind::ALL`] order:
//! stacks, autoscaling groups, instances, security groups, volumes. Each
//! kind records facts later kinds rely on:
//!
//! - stacks mark every managed physical id as in-stack and a dependency
//! - groups inherit marks by id or name, mark their members as in-group
//!   dependencies, and inherit in-stack from a stack-managed member
//! - instances mark the security groups they reference, by id and name
//! - security groups inherit marks by id or group name
//! - volumes are dependencies when marked or attached
//!
//! All marks live in an [`InferenceContext`] owned by one reap cycle.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use reaper_common::ResourceKind;
use tracing::{debug, info};

use crate::resource::{Resource, ResourceDetail};

/// Per-region set of ids (or names) carrying a mark
#[derive(Debug, Default)]
struct RegionIndex(HashMap<String, HashSet<String>>);

impl RegionIndex {
    fn insert(&mut self, region: &str, id: &str) {
        self.0
            .entry(region.to_string())
            .or_default()
            .insert(id.to_string());
    }

    fn contains(&self, region: &str, id: &str) -> bool {
        self.0.get(region).is_some_and(|ids| ids.contains(id))
    }

    /// True if the id, or the name when there is one, is marked
    fn contains_id_or_name(&self, region: &str, id: &str, name: Option<&str>) -> bool {
        self.contains(region, id) || name.is_some_and(|name| self.contains(region, name))
    }
}

/// Facts established so far in one cycle
#[derive(Debug, Default)]
pub struct InferenceContext {
    dependencies: RegionIndex,
    in_stack: RegionIndex,
    in_group: RegionIndex,
}

impl InferenceContext {
    pub fn is_dependency(&self, region: &str, id: &str) -> bool {
        self.dependencies.contains(region, id)
    }

    pub fn is_in_stack(&self, region: &str, id: &str) -> bool {
        self.in_stack.contains(region, id)
    }

    pub fn is_in_group(&self, region: &str, id: &str) -> bool {
        self.in_group.contains(region, id)
    }

    fn mark_in_stack(&mut self, region: &str, id: &str) {
        self.in_stack.insert(region, id);
        self.dependencies.insert(region, id);
    }
}

/// How resources are grouped by owner
#[derive(Debug, Clone)]
pub struct OwnershipRules {
    pub owner_tag: String,
    pub default_email_host: Option<String>,
}

/// Output of a pass: resources bucketed by normalized owner address
#[derive(Debug, Default)]
pub struct Inventory {
    pub owned: BTreeMap<String, Vec<Resource>>,
    pub unowned: Vec<Resource>,
}

impl Inventory {
    pub fn len(&self) -> usize {
        self.owned.values().map(Vec::len).sum::<usize>() + self.unowned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every resource, owned first
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.owned.values().flatten().chain(self.unowned.iter())
    }
}

/// Streaming inference over one cycle's discovered resources
pub struct InferencePass {
    context: InferenceContext,
    rules: OwnershipRules,
    enabled: BTreeSet<ResourceKind>,
    inventory: Inventory,
}

impl InferencePass {
    /// `enabled` limits which kinds are classified into the inventory.
    /// Disabled kinds still contribute marks.
    pub fn new(rules: OwnershipRules, enabled: impl IntoIterator<Item = ResourceKind>) -> Self {
        Self {
            context: InferenceContext::default(),
            rules,
            enabled: enabled.into_iter().collect(),
            inventory: Inventory::default(),
        }
    }

    pub fn context(&self) -> &InferenceContext {
        &self.context
    }

    /// Apply and record marks for one resource, then classify it by owner.
    ///
    /// Callers must observe kinds in [`ResourceKind::ALL`] order.
    pub fn observe(&mut self, mut resource: Resource) {
        self.apply_marks(&mut resource);
        if resource.in_stack {
            resource.dependency = true;
        }

        if !self.enabled.contains(&resource.kind()) {
            return;
        }
        match resource.owner(&self.rules.owner_tag, self.rules.default_email_host.as_deref()) {
            Some(owner) => self.inventory.owned.entry(owner).or_default().push(resource),
            None => self.inventory.unowned.push(resource),
        }
    }

    pub fn finish(self) -> Inventory {
        let inventory = self.inventory;
        debug!(
            owners = inventory.owned.len(),
            unowned = inventory.unowned.len(),
            "Inference pass complete"
        );
        inventory
    }

    fn apply_marks(&mut self, resource: &mut Resource) {
        let ctx = &mut self.context;
        let region = resource.region.clone();
        let id = resource.id.clone();
        let name = resource.name.clone();
        let name = name.as_deref();

        match &mut resource.detail {
            ResourceDetail::Stack(stack) => {
                for managed in &stack.managed_resources {
                    ctx.mark_in_stack(&region, managed);
                }
            }
            ResourceDetail::AutoScalingGroup(group) => {
                let member_in_stack = group
                    .instances
                    .iter()
                    .any(|member| ctx.in_stack.contains(&region, member));
                for member in &group.instances {
                    ctx.in_group.insert(&region, member);
                    ctx.dependencies.insert(&region, member);
                }

                if member_in_stack || ctx.in_stack.contains_id_or_name(&region, &id, name) {
                    resource.in_stack = true;
                }
                if ctx.dependencies.contains_id_or_name(&region, &id, name) {
                    resource.dependency = true;
                }
            }
            ResourceDetail::Instance(instance) => {
                for (sg_id, sg_name) in &instance.security_groups {
                    ctx.dependencies.insert(&region, sg_id);
                    if !sg_name.is_empty() {
                        ctx.dependencies.insert(&region, sg_name);
                    }
                }
                if ctx.in_group.contains(&region, &id) {
                    instance.autoscaled = true;
                }
                if ctx.in_stack.contains(&region, &id) {
                    resource.in_stack = true;
                }
                if ctx.dependencies.contains(&region, &id) {
                    resource.dependency = true;
                }
            }
            ResourceDetail::SecurityGroup(_) => {
                if ctx.in_stack.contains(&region, &id) {
                    resource.in_stack = true;
                }
                if ctx.dependencies.contains_id_or_name(&region, &id, name) {
                    resource.dependency = true;
                }
            }
            ResourceDetail::Volume(volume) => {
                if ctx.in_stack.contains(&region, &id) {
                    resource.in_stack = true;
                }
                if ctx.dependencies.contains(&region, &id) || volume.is_attached() {
                    resource.dependency = true;
                }
            }
        }

        if let Some((down, up)) = resource.schedule() {
            info!(
                resource = %resource,
                scale_down = down,
                scale_up = up,
                "Resource has a scaling schedule"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{
        AutoScalingGroupDetail, InstanceDetail, InstanceState, SecurityGroupDetail, StackDetail,
        VolumeDetail,
    };
    use chrono::Utc;

    const REGION: &str = "us-east-1";

    fn rules() -> OwnershipRules {
        OwnershipRules {
            owner_tag: "Owner".into(),
            default_email_host: Some("example.com".into()),
        }
    }

    fn pass() -> InferencePass {
        InferencePass::new(rules(), ResourceKind::ALL)
    }

    fn resource(id: &str, detail: ResourceDetail) -> Resource {
        Resource::new(REGION, id, detail, Utc::now())
    }

    fn stack(id: &str, managed: &[&str]) -> Resource {
        let mut detail = StackDetail::new("CREATE_COMPLETE");
        detail.managed_resources = managed.iter().map(|s| s.to_string()).collect();
        resource(id, ResourceDetail::Stack(detail))
    }

    fn asg(id: &str, members: &[&str]) -> Resource {
        resource(
            id,
            ResourceDetail::AutoScalingGroup(AutoScalingGroupDetail {
                desired_capacity: Some(members.len() as i64),
                instances: members.iter().map(|s| s.to_string()).collect(),
            }),
        )
        .with_name(id)
    }

    fn instance(id: &str, security_groups: &[(&str, &str)]) -> Resource {
        let mut detail = InstanceDetail::new("t3.micro", InstanceState::Running);
        detail.security_groups = security_groups
            .iter()
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect();
        resource(id, ResourceDetail::Instance(detail))
    }

    fn find<'a>(inventory: &'a Inventory, id: &str) -> &'a Resource {
        inventory.iter().find(|r| r.id == id).unwrap()
    }

    #[test]
    fn test_stack_member_marks_group_and_instance() {
        let mut pass = pass();
        pass.observe(stack("arn:stack/web", &["i-123"]));
        pass.observe(asg("asg-1", &["i-123"]));
        pass.observe(instance("i-123", &[]));
        let inventory = pass.finish();

        for id in ["asg-1", "i-123"] {
            let r = find(&inventory, id);
            assert!(r.dependency, "{id} should be a dependency");
            assert!(r.in_stack, "{id} should be in a stack");
        }
        let ResourceDetail::Instance(detail) = &find(&inventory, "i-123").detail else {
            panic!("expected an instance");
        };
        assert!(detail.autoscaled);
    }

    #[test]
    fn test_group_inherits_marks_by_name() {
        let mut pass = pass();
        pass.observe(stack("arn:stack/api", &["api-asg"]));
        let group = resource(
            "arn:aws:autoscaling:api",
            ResourceDetail::AutoScalingGroup(AutoScalingGroupDetail::default()),
        )
        .with_name("api-asg");
        pass.observe(group);
        let inventory = pass.finish();

        let r = find(&inventory, "arn:aws:autoscaling:api");
        assert!(r.in_stack && r.dependency);
    }

    #[test]
    fn test_group_members_are_dependencies() {
        let mut pass = pass();
        pass.observe(asg("asg-2", &["i-1"]));
        pass.observe(instance("i-1", &[]));
        pass.observe(instance("i-2", &[]));
        let inventory = pass.finish();

        assert!(find(&inventory, "i-1").dependency);
        assert!(!find(&inventory, "i-1").in_stack);
        assert!(!find(&inventory, "i-2").dependency);
        assert!(!find(&inventory, "asg-2").dependency);
    }

    #[test]
    fn test_instances_protect_security_groups_by_id_and_name() {
        let mut pass = pass();
        pass.observe(instance("i-1", &[("sg-1", "web"), ("sg-2", "")]));
        pass.observe(resource("sg-1", ResourceDetail::SecurityGroup(SecurityGroupDetail::default())));
        pass.observe(resource("sg-2", ResourceDetail::SecurityGroup(SecurityGroupDetail::default())));
        pass.observe(
            resource("sg-3", ResourceDetail::SecurityGroup(SecurityGroupDetail::default()))
                .with_name("web"),
        );
        pass.observe(resource("sg-4", ResourceDetail::SecurityGroup(SecurityGroupDetail::default())));
        let inventory = pass.finish();

        assert!(find(&inventory, "sg-1").dependency);
        assert!(find(&inventory, "sg-2").dependency);
        assert!(find(&inventory, "sg-3").dependency, "matched by group name");
        assert!(!find(&inventory, "sg-4").dependency);
    }

    #[test]
    fn test_attached_volumes_are_dependencies() {
        let mut attached = VolumeDetail::new(8, "in-use");
        attached.attachments.push("i-1".into());

        let mut pass = pass();
        pass.observe(stack("arn:stack/db", &["vol-3"]));
        pass.observe(resource("vol-1", ResourceDetail::Volume(attached)));
        pass.observe(resource("vol-2", ResourceDetail::Volume(VolumeDetail::new(8, "available"))));
        pass.observe(resource("vol-3", ResourceDetail::Volume(VolumeDetail::new(8, "available"))));
        let inventory = pass.finish();

        assert!(find(&inventory, "vol-1").dependency);
        assert!(!find(&inventory, "vol-2").dependency);
        let vol3 = find(&inventory, "vol-3");
        assert!(vol3.in_stack && vol3.dependency);
    }

    #[test]
    fn test_marks_are_per_region() {
        let mut pass = pass();
        pass.observe(stack("arn:stack/web", &["i-123"]));
        pass.observe(Resource::new(
            "eu-west-1",
            "i-123",
            ResourceDetail::Instance(InstanceDetail::new("t3.micro", InstanceState::Running)),
            Utc::now(),
        ));
        let inventory = pass.finish();
        let other = inventory.iter().find(|r| r.region == "eu-west-1").unwrap();
        assert!(!other.dependency);
    }

    #[test]
    fn test_owner_bucketing() {
        let mut pass = pass();
        pass.observe(instance("i-1", &[]).with_tag("Owner", "alice@example.com"));
        pass.observe(instance("i-2", &[]).with_tag("Owner", "alice"));
        pass.observe(instance("i-3", &[]).with_tag("Owner", "Bob@Example.com"));
        pass.observe(instance("i-4", &[]));
        let inventory = pass.finish();

        assert_eq!(inventory.owned["alice@example.com"].len(), 2);
        assert_eq!(inventory.owned["bob@example.com"].len(), 1);
        assert_eq!(inventory.unowned.len(), 1);
        assert_eq!(inventory.len(), 4);
    }

    #[test]
    fn test_disabled_kinds_still_contribute_marks() {
        let mut pass = InferencePass::new(rules(), [ResourceKind::Instance]);
        pass.observe(stack("arn:stack/web", &["i-9"]));
        pass.observe(instance("i-9", &[]));
        let inventory = pass.finish();

        assert_eq!(inventory.len(), 1);
        assert!(find(&inventory, "i-9").in_stack);
    }
}
