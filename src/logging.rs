// Macros file - tracing macros are imported within the macro definitions

/// Standardized logging macros for consistent field names and message patterns
/// across the application.

// ============================================================================
// API Operation Logging Macros
// ============================================================================

/// Log the start of an API operation with consistent fields
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, source = $source:expr) => {
        tracing::debug!(
            operation = $operation,
            source = %$source,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(
            operation = $operation,
            "API operation started"
        );
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            "API operation completed: {}", $msg
        );
    };
}

/// Log API warnings with context
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            "API operation warning: {}", $msg
        );
    };
}

// ============================================================================
// Provider Logging Macros
// ============================================================================

/// Log external provider calls with backend context
#[macro_export]
macro_rules! log_provider_event {
    (start, $capability:expr, backend = $backend:expr) => {
        tracing::info!(
            component = "provider",
            capability = $capability,
            backend = %$backend,
            "Provider call started"
        );
    };
    (success, $capability:expr, backend = $backend:expr, $msg:expr) => {
        tracing::info!(
            component = "provider",
            capability = $capability,
            backend = %$backend,
            "Provider call succeeded: {}", $msg
        );
    };
    (failure, $capability:expr, backend = $backend:expr, error = $error:expr) => {
        tracing::warn!(
            component = "provider",
            capability = $capability,
            backend = %$backend,
            error = %$error,
            "Provider call failed"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_logging_macros_compile() {
        let error = anyhow::anyhow!("test error");

        log_api_start!("generate_text", source = "text");
        log_api_start!("generate_text");
        log_api_success!("generate_text", count = 5, "flashcards generated");
        log_api_success!("generate_text", "operation completed");
        log_api_warn!("generate_text", "enrichment skipped");

        log_provider_event!(start, "transcription", backend = "openai-whisper");
        log_provider_event!(success, "transcription", backend = "openai-whisper", "transcript received");
        log_provider_event!(failure, "transcription", backend = "openai-whisper", error = error);

        log_system_event!(startup, component = "server", "server starting");
        log_system_event!(config, "configuration loaded successfully");

        log_validation!(success, "api_request", "request validated");
        log_validation!(failure, "api_request", error = error);
    }
}
