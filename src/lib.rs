/*!
# Knowledge Portal

A small internal knowledge-portal web service built in Rust.

## Overview

The portal is a searchable catalog of links, manuals, FAQs and dashboards,
organized into categories, with an admin panel for content management.
Dashboard items carry a free-text instruction prompt; uploading an Excel
workbook to such an item stores its rows as generic JSON records, and the
prompt is parsed on every view into a chart configuration that drives
grouping, counting and drill-down over those rows.

## Architecture

The application follows a client-server architecture:

### Backend Layer
- **Technologies**: Rust, axum
- **Core Components**:
  - Instruction Parser - Turns an item's prompt into a chart configuration
  - Row Aggregator - Buckets uploaded rows per group and status value
  - Team Comparison - Splits rows into two keyword-matched cohorts
  - Drill-down Projector - Selects the columns shown behind a clicked bucket
  - Spreadsheet Ingestor - Decodes XLSX uploads and replaces an item's rows
  - Auth & Sessions - Argon2 password hashes, in-process session tokens
  - Admin Endpoint - Role-gated user management

### Data Persistence Layer
- JSON file per table under `database/`, mirrored in memory
- Uploaded rows stored with dual positional/header column keys

## Modules

- **model**: Persisted record types and the derived chart configuration
- **instructions**: Free-text prompt parsing
- **aggregate**: Row aggregation and team comparison
- **drilldown**: Drill-down column projection
- **ingest**: XLSX decoding and the upload pipeline
- **store**: File-backed JSON database
- **auth**: Users, sessions and the per-request auth context
- **admin**: Admin user-management endpoint
- **app**: Routing and handlers

## REST API Endpoints

- `POST /api/auth/login`, `POST /api/auth/logout` - Session management
- `GET|PUT /api/config` - Portal display configuration
- `GET|POST /api/categories`, `PUT|DELETE /api/categories/:id` - Category CRUD
- `GET|POST /api/items`, `PUT|DELETE /api/items/:id` - Item CRUD
- `GET /api/items/:id/dashboard` - Parsed config plus aggregated chart series
- `GET /api/items/:id/rows` - Raw uploaded rows
- `POST /api/items/:id/upload` - Replace an item's rows from an XLSX upload
- `POST /api/admin/users` - Action-discriminated admin user management
*/

// Re-export all modules so they appear in the documentation
pub mod admin;
pub mod aggregate;
pub mod app;
pub mod auth;
pub mod drilldown;
pub mod ingest;
pub mod instructions;
pub mod model;
pub mod store;

/// Re-export everything from these modules to make it easier to use
pub use aggregate::*;
pub use drilldown::*;
pub use ingest::*;
pub use instructions::*;
pub use model::*;
pub use store::*;
