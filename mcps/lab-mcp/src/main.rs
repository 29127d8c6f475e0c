//! Script Lab MCP Server binary

use lab_mcp::LabServer;

mcp_common::serve_stdio!(LabServer, "lab_mcp");
