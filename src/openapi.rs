//! OpenAPI 3 description of the booking API and a Swagger UI page that
//! renders it.

use axum::response::{Html, IntoResponse, Json};
use serde_json::{json, Value};

use crate::constants::{MAX_CLEANERS, MIN_CLEANERS};

pub const API_TITLE: &str = "Cleaning Service API";
pub const API_VERSION: &str = "1.0.0";
pub const API_DESCRIPTION: &str = "API for managing cleaning service bookings and availability";

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": { "application/json": { "schema": { "$ref": "#/components/schemas/ErrorResponse" } } }
    })
}

fn booking_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": { "application/json": { "schema": { "$ref": "#/components/schemas/BookingResponse" } } }
    })
}

fn id_parameter() -> Value {
    json!({
        "name": "id",
        "in": "path",
        "required": true,
        "schema": { "type": "integer", "format": "int64" }
    })
}

fn paths() -> Value {
    json!({
        "/api/bookings/availability": {
            "post": {
                "tags": ["Booking"],
                "summary": "Check availability",
                "description": "Get available cleaners for date/time",
                "requestBody": {
                    "required": true,
                    "content": { "application/json": { "schema": { "$ref": "#/components/schemas/AvailabilityRequest" } } }
                },
                "responses": {
                    "200": {
                        "description": "Cleaners with at least one free slot",
                        "content": { "application/json": { "schema": {
                            "type": "array",
                            "items": { "$ref": "#/components/schemas/CleanerAvailability" }
                        } } }
                    },
                    "400": error_response("Friday, invalid duration or malformed request")
                }
            }
        },
        "/api/bookings": {
            "post": {
                "tags": ["Booking"],
                "summary": "Create Booking",
                "description": "Create a new cleaning appointment",
                "requestBody": {
                    "required": true,
                    "content": { "application/json": { "schema": { "$ref": "#/components/schemas/BookingRequest" } } }
                },
                "responses": {
                    "201": booking_response("Booking created"),
                    "400": error_response("Rule violation or no cleaners available")
                }
            }
        },
        "/api/bookings/{id}": {
            "get": {
                "tags": ["Booking"],
                "summary": "Get Booking",
                "description": "Fetch a booking by id",
                "parameters": [id_parameter()],
                "responses": {
                    "200": booking_response("Booking found"),
                    "404": error_response("Booking not found")
                }
            },
            "put": {
                "tags": ["Booking"],
                "summary": "Update Booking",
                "description": "Update date/time of an existing booking",
                "parameters": [id_parameter()],
                "requestBody": {
                    "required": true,
                    "content": { "application/json": { "schema": { "$ref": "#/components/schemas/BookingUpdateRequest" } } }
                },
                "responses": {
                    "200": booking_response("Booking rescheduled"),
                    "400": error_response("Rule violation or cleaners busy at the new time"),
                    "404": error_response("Booking not found")
                }
            }
        }
    })
}

fn schemas() -> Value {
    json!({
        "AvailabilityRequest": {
            "type": "object",
            "description": "Request to check cleaner availability",
            "required": ["date"],
            "properties": {
                "date": { "type": "string", "format": "date", "example": "2023-11-23", "description": "Date to check availability (cannot be Friday)" },
                "startTime": { "type": "string", "example": "10:00", "description": "Specific start time to check (optional - if not provided, returns all available slots)" },
                "duration": { "type": "integer", "enum": [2, 4], "description": "Duration in hours (optional - if not provided, returns all available slots)" }
            }
        },
        "BookingRequest": {
            "type": "object",
            "description": "Request to create a new booking",
            "required": ["date", "startTime", "duration", "customerName"],
            "properties": {
                "date": { "type": "string", "format": "date", "example": "2023-11-23", "description": "Booking date (cannot be Friday)" },
                "startTime": { "type": "string", "example": "10:00", "description": "Start time (between 08:00 and 22:00)" },
                "duration": { "type": "integer", "enum": [2, 4], "description": "Duration in hours (must be 2 or 4)" },
                "cleanerCount": { "type": "integer", "minimum": MIN_CLEANERS, "maximum": MAX_CLEANERS, "example": 2, "description": "Number of cleaners required (1-3)" },
                "customerName": { "type": "string", "example": "John Doe" },
                "customerPhone": { "type": "string", "example": "+1234567890", "description": "Customer phone number (optional)" }
            }
        },
        "BookingUpdateRequest": {
            "type": "object",
            "description": "Request to update an existing booking",
            "required": ["date", "startTime"],
            "properties": {
                "date": { "type": "string", "format": "date", "example": "2023-11-23", "description": "New booking date (cannot be Friday)" },
                "startTime": { "type": "string", "example": "14:00", "description": "New start time (between 08:00 and 22:00)" }
            }
        },
        "BookingResponse": {
            "type": "object",
            "description": "Booking response with booking details",
            "properties": {
                "id": { "type": "integer", "format": "int64", "example": 1 },
                "startDateTime": { "type": "string", "example": "2023-11-23T10:00:00" },
                "endDateTime": { "type": "string", "example": "2023-11-23T12:00:00" },
                "durationHours": { "type": "integer", "enum": [2, 4] },
                "cleanerNames": { "type": "array", "items": { "type": "string" }, "example": ["John", "Jane"] },
                "customerName": { "type": "string", "example": "John Doe" }
            }
        },
        "CleanerAvailability": {
            "type": "object",
            "description": "Cleaner availability information",
            "properties": {
                "cleanerId": { "type": "integer", "format": "int64", "example": 1 },
                "name": { "type": "string", "example": "John Doe" },
                "vehicleId": { "type": "integer", "format": "int64", "example": 1 },
                "availableTimeSlots": { "type": "array", "items": { "type": "string" }, "example": ["08:00 (2h)", "08:00 (4h)", "08:30 (2h)"] }
            }
        },
        "ErrorResponse": {
            "type": "object",
            "properties": {
                "status": { "type": "integer", "example": 400 },
                "error": { "type": "string", "example": "Bad Request" },
                "message": { "type": "string", "example": "We do not work on Fridays." },
                "timestamp": { "type": "string", "format": "date-time" }
            }
        }
    })
}

pub fn document() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": API_TITLE,
            "version": API_VERSION,
            "description": API_DESCRIPTION
        },
        "tags": [{ "name": "Booking", "description": "Booking management APIs" }],
        "paths": paths(),
        "components": { "schemas": schemas() }
    })
}

pub async fn api_docs() -> impl IntoResponse {
    Json(document())
}

/// Swagger UI (pinned CDN version) pointed at `/v3/api-docs`
pub async fn swagger_ui() -> impl IntoResponse {
    let html = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Cleaning Service API</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5.11.0/swagger-ui.css" />
  </head>
  <body>
    <div id="swagger-ui"></div>
    <script src="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5.11.0/swagger-ui-bundle.js" crossorigin="anonymous"></script>
    <script>
      window.onload = function () {
        window.ui = SwaggerUIBundle({ url: '/v3/api-docs', dom_id: '#swagger-ui' });
      };
    </script>
  </body>
</html>"#;
    Html(html)
}
