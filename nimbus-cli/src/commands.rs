//! Command workflows
//!
//! Every workflow takes the provider and state backend as trait objects so
//! it runs the same against UpCloud and against test doubles.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::io::{self, Write};

use colored::Colorize;
use log::debug;
use nimbus_core::differ::create_plan;
use nimbus_core::effect::Effect;
use nimbus_core::plan::{Plan, PlanSummary};
use nimbus_core::provider::{Provider, ProviderError, ProviderResult};
use nimbus_core::resource::{Resource, ResourceId, State};
use nimbus_core::schema::ResourceSchema;
use nimbus_state::{ResourceState, StateBackend, StateFile};

use crate::config::{schemas, validate_resources};
use crate::display::{print_diagnostics, print_plan};
use crate::error::CliError;

pub fn validate(resources: &[Resource], schemas: &HashMap<String, ResourceSchema>) -> Result<(), CliError> {
    let validated = validate_resources(resources, schemas)?;
    for resource in &validated {
        println!("  {} {}", "✓".green(), resource.id);
    }
    println!(
        "{}",
        format!("Validation successful: {} resources", validated.len()).green()
    );
    Ok(())
}

pub async fn plan(
    resources: &[Resource],
    provider: &dyn Provider,
    backend: &dyn StateBackend,
) -> Result<Plan, CliError> {
    let schemas = schemas(provider.resource_types());
    let resources = validate_resources(resources, &schemas)?;
    let state_file = backend.read_state().await?.unwrap_or_default();

    let current = refresh(provider, &resources, &state_file).await?;
    let plan = create_plan(&resources, &current, &schemas);
    print_plan(&plan, &schemas);
    Ok(plan)
}

/// Returns the number of effects applied
pub async fn apply(
    resources: &[Resource],
    provider: &dyn Provider,
    backend: &dyn StateBackend,
) -> Result<usize, CliError> {
    let schemas = schemas(provider.resource_types());
    let resources = validate_resources(resources, &schemas)?;

    let lock = backend.acquire_lock("apply").await?;
    let result = apply_locked(&resources, &schemas, provider, backend).await;
    let released = backend.release_lock(&lock).await;
    let applied = result?;
    released?;
    Ok(applied)
}

async fn apply_locked(
    resources: &[Resource],
    schemas: &HashMap<String, ResourceSchema>,
    provider: &dyn Provider,
    backend: &dyn StateBackend,
) -> Result<usize, CliError> {
    let mut state_file = backend.read_state().await?.unwrap_or_default();
    let current = refresh(provider, resources, &state_file).await?;
    if sync_state(&mut state_file, &current, provider.name()) {
        persist(backend, &mut state_file).await?;
    }

    let plan = create_plan(resources, &current, schemas);
    if plan.is_empty() {
        println!("{}", "No changes needed.".green());
        return Ok(0);
    }

    print_plan(&plan, schemas);
    println!();

    let rejected: Vec<String> = plan
        .effects()
        .iter()
        .filter_map(|effect| match effect {
            Effect::Replace { from, to, .. } => provider
                .validate_replace(from, to)
                .err()
                .map(|e| e.for_resource(effect.resource_id().clone()).to_string()),
            _ => None,
        })
        .collect();
    if !rejected.is_empty() {
        return Err(CliError::ReplaceRejected(rejected));
    }

    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let mut succeeded = 0;
    let mut failed = 0;

    for effect in execution_order(&plan, &state_file) {
        let result = execute(provider, backend, effect, &mut state_file).await;
        persist(backend, &mut state_file).await?;
        match result {
            Ok(()) => {
                println!("  {} {}", "✓".green(), effect);
                succeeded += 1;
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), effect, e);
                failed += 1;
            }
        }
    }

    println!();
    if failed > 0 {
        return Err(CliError::ApplyFailed { succeeded, failed });
    }
    println!(
        "{}",
        format!("Apply complete! {} changes applied.", succeeded)
            .green()
            .bold()
    );
    Ok(succeeded)
}

/// Plan order, with deletes moved last in reverse state order
fn execution_order<'a>(plan: &'a Plan, state_file: &StateFile) -> Vec<&'a Effect> {
    let positions: HashMap<ResourceId, usize> = state_file
        .resources
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id(), i))
        .collect();

    let (mut deletes, mut order): (Vec<&Effect>, Vec<&Effect>) =
        plan.effects().iter().partition(|e| e.is_delete());
    deletes.sort_by_key(|e| Reverse(positions.get(e.resource_id()).copied()));
    order.extend(deletes);
    order
}

async fn execute(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    effect: &Effect,
    state_file: &mut StateFile,
) -> ProviderResult<()> {
    match effect {
        Effect::Create(resource) => {
            let state = provider.create(resource).await?;
            record(state_file, &state, provider.name());
        }
        Effect::Update { id, from, to, .. } => {
            let state = provider.update(id, identifier(from)?, from, to).await?;
            record(state_file, &state, provider.name());
        }
        Effect::Replace { id, from, to, .. } => {
            provider.delete(id, identifier(from)?, from).await?;
            state_file.remove_resource(id);
            // The old object is gone even if the create below fails
            persist(backend, state_file)
                .await
                .map_err(|e| ProviderError::new(e.to_string()).for_resource(id.clone()))?;
            let state = provider.create(to).await?;
            record(state_file, &state, provider.name());
        }
        Effect::Delete { id, from } => {
            if let Some(identifier) = from.identifier.as_deref() {
                provider.delete(id, identifier, from).await?;
            }
            state_file.remove_resource(id);
        }
    }
    Ok(())
}

/// Returns the number of resources destroyed
pub async fn destroy(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    auto_approve: bool,
) -> Result<usize, CliError> {
    let lock = backend.acquire_lock("destroy").await?;
    let result = destroy_locked(provider, backend, auto_approve).await;
    let released = backend.release_lock(&lock).await;
    let destroyed = result?;
    released?;
    Ok(destroyed)
}

async fn destroy_locked(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    auto_approve: bool,
) -> Result<usize, CliError> {
    let mut state_file = backend.read_state().await?.unwrap_or_default();
    let current = refresh(provider, &[], &state_file).await?;
    if sync_state(&mut state_file, &current, provider.name()) {
        persist(backend, &mut state_file).await?;
    }

    if state_file.resources.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(0);
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for stored in state_file.resources.iter().rev() {
        println!("  {} {}", "-".red().bold(), stored.id().to_string().cyan().bold());
    }
    println!();
    let summary = PlanSummary {
        delete: state_file.resources.len(),
        ..Default::default()
    };
    println!("{}", summary.to_string().bold());
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(0);
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let mut succeeded = 0;
    let mut failed = 0;

    let targets: Vec<ResourceState> = state_file.resources.iter().rev().cloned().collect();
    for stored in targets {
        let id = stored.id();
        let from = stored.to_state();
        let result = match stored.identifier.as_deref() {
            Some(identifier) => provider.delete(&id, identifier, &from).await,
            None => Ok(()),
        };

        match result {
            Ok(()) => {
                state_file.remove_resource(&id);
                persist(backend, &mut state_file).await?;
                println!("  {} - {}", "✓".green(), id);
                succeeded += 1;
            }
            Err(e) => {
                println!("  {} - {} - {}", "✗".red(), id, e);
                failed += 1;
            }
        }
    }

    println!();
    if failed > 0 {
        return Err(CliError::DestroyFailed { succeeded, failed });
    }
    println!(
        "{}",
        format!("Destroy complete! {} resources destroyed.", succeeded)
            .green()
            .bold()
    );
    Ok(succeeded)
}

pub async fn import(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    id: &ResourceId,
    import_id: &str,
) -> Result<(), CliError> {
    let lock = backend.acquire_lock("import").await?;
    let result = import_locked(provider, backend, id, import_id).await;
    let released = backend.release_lock(&lock).await;
    result?;
    released?;
    Ok(())
}

async fn import_locked(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    id: &ResourceId,
    import_id: &str,
) -> Result<(), CliError> {
    let mut state_file = backend.read_state().await?.unwrap_or_default();
    if state_file.find_resource(id).is_some() {
        return Err(CliError::AlreadyManaged(id.to_string()));
    }

    let state = provider.import(id, import_id).await?;
    print_diagnostics(&state.diagnostics);
    if !state.exists {
        return Err(ProviderError::new("Cannot import non-existent remote object")
            .for_resource(id.clone())
            .into());
    }

    record(&mut state_file, &state, provider.name());
    persist(backend, &mut state_file).await?;

    println!(
        "{}",
        format!("Import successful: {} ({})", id, state.identifier.as_deref().unwrap_or(import_id))
            .green()
            .bold()
    );
    Ok(())
}

pub async fn state_list(backend: &dyn StateBackend) -> Result<(), CliError> {
    let state_file = backend.read_state().await?.unwrap_or_default();
    if state_file.resources.is_empty() {
        println!("No resources in state.");
        return Ok(());
    }

    for stored in &state_file.resources {
        println!(
            "{}\t{}",
            stored.id(),
            stored.identifier.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub async fn force_unlock(backend: &dyn StateBackend, lock_id: &str) -> Result<(), CliError> {
    backend.force_unlock(lock_id).await?;
    println!("{}", format!("Lock {} removed.", lock_id).green());
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

/// Read the current state of every declared or stored resource
async fn refresh(
    provider: &dyn Provider,
    resources: &[Resource],
    state_file: &StateFile,
) -> Result<HashMap<ResourceId, State>, CliError> {
    let identifiers = state_file.identifiers();

    let mut ids: Vec<ResourceId> = resources.iter().map(|r| r.id.clone()).collect();
    for stored in &state_file.resources {
        let id = stored.id();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    let mut current = HashMap::with_capacity(ids.len());
    for id in ids {
        let state = provider
            .read(&id, identifiers.get(&id).map(String::as_str))
            .await?;
        print_diagnostics(&state.diagnostics);
        current.insert(id, state);
    }
    Ok(current)
}

/// Bring stored entries in line with what was read; returns whether anything changed
///
/// Entries whose remote object is gone are dropped.
fn sync_state(state_file: &mut StateFile, current: &HashMap<ResourceId, State>, provider: &str) -> bool {
    let mut changed = false;
    for stored in state_file.resources.clone() {
        let id = stored.id();
        match current.get(&id) {
            Some(state) if state.exists => {
                let refreshed = ResourceState::from_state(state, provider);
                if refreshed != stored {
                    state_file.upsert_resource(refreshed);
                    changed = true;
                }
            }
            Some(_) => {
                debug!("dropping {} from state", id);
                state_file.remove_resource(&id);
                changed = true;
            }
            None => {}
        }
    }
    changed
}

fn record(state_file: &mut StateFile, state: &State, provider: &str) {
    state_file.upsert_resource(ResourceState::from_state(state, provider));
}

async fn persist(backend: &dyn StateBackend, state_file: &mut StateFile) -> Result<(), CliError> {
    state_file.increment_serial();
    backend.write_state(state_file).await?;
    Ok(())
}

fn identifier(from: &State) -> ProviderResult<&str> {
    from.identifier.as_deref().ok_or_else(|| {
        ProviderError::new("Remote identifier is missing from state").for_resource(from.id.clone())
    })
}

fn confirm(question: &str) -> Result<bool, CliError> {
    print!("{} Only 'yes' will be accepted: ", question);
    io::stdout().flush().map_err(CliError::Prompt)?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer).map_err(CliError::Prompt)?;
    Ok(answer.trim() == "yes")
}
