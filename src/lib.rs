// Supabase MCP Gateway - Library Root
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// All modules exported here for use by the binary and tests.

pub mod paths;
pub mod config;
pub mod audit;

// ============================================================================
// GATEWAY CORE - registry, validation, dispatch, envelope
// ============================================================================

/// Uniform success/failure wrapper returned for every invocation
pub mod envelope;

/// Outbound seam: operations, argument bags, failure modes
pub mod backend;

/// Sealed capability allow-list
pub mod registry;

/// Argument validation and normalization against input shapes
pub mod validate;

/// Lookup -> validate -> dispatch -> normalize
pub mod gateway;

/// The eight exposed tools and their render rules
pub mod tools;

// ============================================================================
// COLLABORATORS - backend client and inbound transport
// ============================================================================

pub mod supabase;
pub mod mcp;
